//! Output side of a run: local batch files and their publication.
//!
//! [`BatchSink`] owns the active `cur.<ext>` file and finalizes it into
//! numbered batches; [`Publisher`] pushes each finished batch to a
//! [`DatasetStore`] such as [`HfUploader`].

pub mod hf_uploader;
pub mod publisher;
pub mod sink;

pub use hf_uploader::{resolve_owner, HfUploadConfig, HfUploader};
pub use publisher::{DatasetStore, Publisher};
pub use sink::{BatchSink, FinishedBatch, OutputRecord, ACTIVE_STEM};
