//! Command-line interface for muse-forge.
//!
//! Provides the generation loop, config scaffolding and template listing.

mod commands;

pub use commands::{build_orchestrator, parse_cli, run, run_with_cli, Cli, Commands, RunArgs};
