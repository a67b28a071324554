//! Durable JSONL output with size-based batch rotation.
//!
//! Records are appended to `cur.<ext>` in the output directory, one JSON
//! object per line, flushed after every write. When the active file holds
//! `target` records it is renamed to `<index>.<ext>`, where `index` is the
//! smallest unused index at or above the next candidate, and a fresh active
//! file is opened. A restart picks up an existing active file and continues
//! counting from its line count.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Stem of the active batch file.
pub const ACTIVE_STEM: &str = "cur";

/// One line of a batch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub text: String,
}

impl OutputRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A batch that has been renamed to its final index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedBatch {
    pub path: PathBuf,
    pub index: u64,
    pub records: usize,
    pub finalized_at: DateTime<Utc>,
}

impl FinishedBatch {
    /// File name of the batch, used as its name in the remote repository.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.index.to_string())
    }

    /// Time elapsed between finalization and `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now.signed_duration_since(self.finalized_at)
    }
}

/// Writer for the active batch.
#[derive(Debug)]
pub struct BatchSink {
    dir: PathBuf,
    extension: String,
    target: usize,
    /// First index the next rotation will try.
    next_index: u64,
    file: Option<File>,
    count: usize,
}

impl BatchSink {
    /// Open (or resume) the active batch in `dir`.
    ///
    /// An existing `cur.<ext>` is kept and its newline-terminated lines are
    /// counted. A trailing partial line left by an interrupted write is cut
    /// off so the next record starts on a line of its own.
    pub fn open(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        target: usize,
        begin_index: u64,
    ) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(SinkError::file("create directory", &dir))?;

        let mut sink = Self {
            dir,
            extension: extension.into(),
            target,
            next_index: begin_index,
            file: None,
            count: 0,
        };

        let path = sink.active_path();
        sink.count = if path.exists() {
            resume_lines(&path)?
        } else {
            0
        };
        sink.file = Some(open_append(&path)?);

        if sink.count > 0 {
            tracing::info!(
                path = %path.display(),
                records = sink.count,
                target,
                "Resuming active batch"
            );
        }
        Ok(sink)
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", ACTIVE_STEM, self.extension))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records in the active batch.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Whether the active batch has reached its target size.
    pub fn is_full(&self) -> bool {
        self.count >= self.target
    }

    /// Append one record and rotate if the batch just reached its target.
    pub fn append(&mut self, record: &OutputRecord) -> Result<Option<FinishedBatch>, SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.active_path();
        let file = match self.file.take() {
            Some(file) => file,
            None => open_append(&path)?,
        };
        let file = self.file.insert(file);
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(SinkError::file("append to", &path))?;
        self.count += 1;

        if self.is_full() {
            return self.rotate().map(Some);
        }
        Ok(None)
    }

    /// Finalize the active batch under the next free index and start a new one.
    pub fn rotate(&mut self) -> Result<FinishedBatch, SinkError> {
        let active = self.active_path();
        // Close before renaming.
        drop(self.file.take());

        let mut index = self.next_index;
        let mut target_path = self.batch_path(index);
        while target_path.exists() {
            index += 1;
            target_path = self.batch_path(index);
        }

        std::fs::rename(&active, &target_path).map_err(SinkError::file("rename", &active))?;
        self.next_index = index + 1;

        let batch = FinishedBatch {
            path: target_path,
            index,
            records: self.count,
            finalized_at: Utc::now(),
        };
        self.count = 0;
        self.file = Some(open_append(&active)?);

        tracing::info!(
            path = %batch.path.display(),
            index = batch.index,
            records = batch.records,
            finalized_at = %batch.finalized_at.to_rfc3339(),
            "Finalized batch"
        );
        Ok(batch)
    }

    fn batch_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", index, self.extension))
    }
}

fn open_append(path: &Path) -> Result<File, SinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(SinkError::file("open", path))
}

/// Count newline-terminated lines, truncating any trailing partial line.
fn resume_lines(path: &Path) -> Result<usize, SinkError> {
    let file = File::open(path).map_err(SinkError::file("read", path))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; 64 * 1024];
    let mut lines = 0usize;
    let mut len = 0u64;
    let mut complete_len = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(SinkError::file("read", path))?;
        if n == 0 {
            break;
        }
        for (offset, byte) in buf[..n].iter().enumerate() {
            if *byte == b'\n' {
                lines += 1;
                complete_len = len + offset as u64 + 1;
            }
        }
        len += n as u64;
    }

    if complete_len < len {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = len - complete_len,
            "Truncating partial trailing line in active batch"
        );
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(SinkError::file("open", path))?;
        file.set_len(complete_len)
            .map_err(SinkError::file("truncate", path))?;
    }

    Ok(lines)
}
