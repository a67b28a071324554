//! Cooperative request scheduling.
//!
//! Everything runs on a single-threaded runtime. Every tick the
//! [`Dispatcher`] spawns one request per credential without waiting for
//! earlier ones, the [`Harvester`] drains whichever requests have resolved,
//! and the [`Orchestrator`] writes their records and rotates and publishes
//! full batches.
//!
//! ```text
//!   Selector ──▶ Dispatcher ──spawn──▶ TaskSet ──▶ Harvester ──▶ BatchSink ──▶ Publisher
//!                    ▲                                                          │
//!                    └──────────────────── next tick ◀──────────────────────────┘
//! ```

pub mod dispatcher;
pub mod harvester;
pub mod orchestrator;
pub mod progress;
pub mod selector;
pub mod task;

pub use dispatcher::Dispatcher;
pub use harvester::{Harvest, Harvester};
pub use orchestrator::{Orchestrator, TickReport};
pub use progress::{ProgressCounters, ProgressMonitor, ProgressSnapshot};
pub use selector::{Selection, Selector};
pub use task::{GenerationTask, ResolvedTask, TaskError, TaskId, TaskOutcome, TaskSet};
