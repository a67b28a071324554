//! Upload of finished batches, retried until it succeeds.

use std::time::Duration;

use async_trait::async_trait;

use super::sink::FinishedBatch;
use crate::error::ExportError;

/// A remote repository that batch files are uploaded to.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Create the repository if it does not exist yet. Must be idempotent.
    async fn ensure_repo(&self) -> Result<(), ExportError>;

    /// Upload `content` as `name` at the root of the repository.
    async fn upload(&self, name: &str, content: Vec<u8>) -> Result<(), ExportError>;

    /// Human-readable location of the repository, for logs.
    fn location(&self) -> String;
}

/// Publishes finished batches, retrying with a fixed delay.
///
/// `publish` only returns once the batch is uploaded. The local file is read
/// afresh on every attempt and never renamed or copied.
pub struct Publisher {
    store: Box<dyn DatasetStore>,
    retry_delay: Duration,
    repo_ready: bool,
}

impl Publisher {
    pub fn new(store: Box<dyn DatasetStore>, retry_delay: Duration) -> Self {
        Self {
            store,
            retry_delay,
            repo_ready: false,
        }
    }

    /// Upload a finished batch, retrying forever. Returns the number of
    /// attempts it took.
    pub async fn publish(&mut self, batch: &FinishedBatch) -> usize {
        let name = batch.file_name();
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.try_publish(batch, &name).await {
                Ok(()) => {
                    let waited = batch.age_at(chrono::Utc::now());
                    tracing::info!(
                        file = %name,
                        records = batch.records,
                        repo = %self.store.location(),
                        attempts = attempt,
                        since_finalized_ms = waited.num_milliseconds(),
                        "Published batch"
                    );
                    return attempt;
                }
                Err(e) => {
                    tracing::warn!(
                        file = %name,
                        attempt,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        error = %e,
                        "Batch upload failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_publish(&mut self, batch: &FinishedBatch, name: &str) -> Result<(), ExportError> {
        if !self.repo_ready {
            self.store.ensure_repo().await?;
            self.repo_ready = true;
        }
        let content = tokio::fs::read(&batch.path).await?;
        self.store.upload(name, content).await
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("store", &self.store.location())
            .field("retry_delay", &self.retry_delay)
            .field("repo_ready", &self.repo_ready)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Store that fails the first `failures` uploads, then records uploads.
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub failures: usize,
        pub ensure_calls: AtomicUsize,
        pub upload_calls: AtomicUsize,
        pub uploaded: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl FlakyStore {
        pub(crate) fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl DatasetStore for Arc<FlakyStore> {
        async fn ensure_repo(&self) -> Result<(), ExportError> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn upload(&self, name: &str, content: Vec<u8>) -> Result<(), ExportError> {
            let call = self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ExportError::UploadFailed {
                    file: name.to_string(),
                    reason: "503 Service Unavailable".to_string(),
                });
            }
            self.uploaded
                .lock()
                .unwrap()
                .push((name.to_string(), content));
            Ok(())
        }

        fn location(&self) -> String {
            "mock://store".to_string()
        }
    }

    fn batch(dir: &TempDir, index: u64) -> FinishedBatch {
        let path = dir.path().join(format!("{}.jsonl", index));
        std::fs::write(&path, "{\"text\":\"a\"}\n").unwrap();
        FinishedBatch {
            path,
            index,
            records: 1,
            finalized_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_first_try() {
        let dir = TempDir::new().unwrap();
        let store = FlakyStore::failing(0);
        let mut publisher = Publisher::new(Box::new(store.clone()), Duration::from_millis(1));

        assert_eq!(publisher.publish(&batch(&dir, 0)).await, 1);
        let uploaded = store.uploaded.lock().unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].0, "0.jsonl");
        assert_eq!(uploaded[0].1, b"{\"text\":\"a\"}\n");
    }

    #[tokio::test]
    async fn test_publish_retries_until_success() {
        let dir = TempDir::new().unwrap();
        let store = FlakyStore::failing(2);
        let mut publisher = Publisher::new(Box::new(store.clone()), Duration::from_millis(1));

        let batch = batch(&dir, 3);
        assert_eq!(publisher.publish(&batch).await, 3);
        assert_eq!(store.upload_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.uploaded.lock().unwrap().len(), 1);
        assert!(batch.path.is_file());
    }

    #[tokio::test]
    async fn test_repo_is_ensured_once() {
        let dir = TempDir::new().unwrap();
        let store = FlakyStore::failing(1);
        let mut publisher = Publisher::new(Box::new(store.clone()), Duration::from_millis(1));

        publisher.publish(&batch(&dir, 0)).await;
        publisher.publish(&batch(&dir, 1)).await;
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.uploaded.lock().unwrap().len(), 2);
    }
}
