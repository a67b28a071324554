//! muse-forge: synthetic textbook generation at the pace of a key fleet.
//!
//! Passages from instruction datasets are wrapped in prompt templates and
//! sent to a text-generation endpoint, one request per API key per tick.
//! Extracted answers are appended to JSONL batches that rotate at a fixed
//! size and are uploaded to a HuggingFace dataset repository.
//!
//! The pieces, leaves first:
//!
//! - [`template`] and [`passage`]: what gets asked
//! - [`llm`]: who gets asked
//! - [`scheduler`]: the tick loop that dispatches and harvests requests
//! - [`export`]: batch files and their publication

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod llm;
pub mod passage;
pub mod scheduler;
pub mod template;

// Re-export commonly used error types
pub use error::{
    ConfigError, ExportError, LlmError, PassageError, RunError, SinkError, TemplateError,
};
