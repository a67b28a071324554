//! Collection of resolved tasks.

use super::task::{ResolvedTask, TaskOutcome, TaskSet};

/// What one harvest pass produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Harvest {
    /// Extracted texts to write, in no particular order.
    pub records: Vec<String>,
    /// Successful tasks whose extraction came back empty.
    pub empty: usize,
    /// Tasks that failed or panicked.
    pub failed: usize,
}

/// Drains finished tasks from a [`TaskSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Harvester {
    verbose_errors: bool,
}

impl Harvester {
    /// With `verbose_errors`, failures are logged with their `Debug` form.
    pub fn new(verbose_errors: bool) -> Self {
        Self { verbose_errors }
    }

    /// Remove every resolved task from `tasks`, keeping pending ones.
    ///
    /// Empty extractions are dropped without logging; failures are logged
    /// with the credential fingerprint and dropped. Nothing is retried.
    pub fn harvest(&self, tasks: &mut TaskSet) -> Harvest {
        let mut harvest = Harvest::default();
        for resolved in tasks.take_finished() {
            self.absorb(resolved, &mut harvest);
        }
        harvest
    }

    fn absorb(&self, resolved: ResolvedTask, harvest: &mut Harvest) {
        let ResolvedTask {
            id,
            template,
            result,
            ..
        } = resolved;

        match result {
            Ok(TaskOutcome::Succeeded { text }) if text.is_empty() => harvest.empty += 1,
            Ok(TaskOutcome::Succeeded { text }) => harvest.records.push(text),
            Ok(TaskOutcome::Failed { credential, error }) => {
                harvest.failed += 1;
                if self.verbose_errors {
                    tracing::warn!(
                        task = %id,
                        template = %template,
                        credential = %credential,
                        error = ?error,
                        "Generation request failed"
                    );
                } else {
                    tracing::warn!(
                        task = %id,
                        template = %template,
                        credential = %credential,
                        error = %error,
                        "Generation request failed"
                    );
                }
            }
            Err(join_error) => {
                harvest.failed += 1;
                tracing::error!(task = %id, error = %join_error, "Unexpected error in task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Credential, GenerationRequest, LlmProvider};
    use crate::scheduler::task::tests::{sampling, section_template, settle, FixedProvider};
    use crate::scheduler::task::GenerationTask;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    fn spawn(tasks: &mut TaskSet, provider: Arc<dyn LlmProvider>) {
        tasks.spawn(
            GenerationTask::new(
                Credential::new("k"),
                section_template("lecture"),
                "p".into(),
            ),
            provider,
            sampling(),
        );
    }

    #[tokio::test]
    async fn test_partitions_outcomes() {
        let mut tasks = TaskSet::new();
        spawn(&mut tasks, FixedProvider::ok("<lecture>kept</lecture>"));
        spawn(&mut tasks, FixedProvider::ok("<lecture>  </lecture>"));
        spawn(&mut tasks, FixedProvider::failing());
        spawn(&mut tasks, FixedProvider::ok("untagged"));
        settle(&tasks).await;

        let harvest = Harvester::new(false).harvest(&mut tasks);
        assert_eq!(harvest.records, vec!["kept".to_string()]);
        assert_eq!(harvest.empty, 1);
        assert_eq!(harvest.failed, 2);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_is_dropped() {
        struct Panics;

        #[async_trait]
        impl LlmProvider for Panics {
            async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmError> {
                panic!("provider bug")
            }
        }

        let mut tasks = TaskSet::new();
        spawn(&mut tasks, Arc::new(Panics));
        spawn(&mut tasks, FixedProvider::ok("<lecture>fine</lecture>"));
        settle(&tasks).await;

        let harvest = Harvester::new(true).harvest(&mut tasks);
        assert_eq!(harvest.records, vec!["fine".to_string()]);
        assert_eq!(harvest.failed, 1);
        assert!(tasks.is_empty());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Harvest one failed task and return what was logged.
    async fn failure_log(verbose_errors: bool) -> String {
        let credential = Credential::new("sk-live-do-not-log");
        let mut tasks = TaskSet::new();
        tasks.spawn(
            GenerationTask::new(credential.clone(), section_template("lecture"), "p".into()),
            FixedProvider::failing(),
            sampling(),
        );
        settle(&tasks).await;

        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let harvest = tracing::subscriber::with_default(subscriber, || {
            Harvester::new(verbose_errors).harvest(&mut tasks)
        });
        assert_eq!(harvest.failed, 1);

        let log = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("Generation request failed"));
        assert!(log.contains(&credential.to_string()));
        assert!(!log.contains("sk-live-do-not-log"));
        log
    }

    #[tokio::test]
    async fn test_failure_logged_with_display_by_default() {
        let log = failure_log(false).await;
        assert!(log.contains("error=generation error:"));
        assert!(!log.contains("Generation(ApiError"));
    }

    #[tokio::test]
    async fn test_failure_logged_with_debug_when_verbose() {
        let log = failure_log(true).await;
        assert!(log.contains("Generation(ApiError"));
    }

    #[tokio::test]
    async fn test_nothing_resolved_yields_empty_harvest() {
        let mut tasks = TaskSet::new();
        assert_eq!(Harvester::default().harvest(&mut tasks), Harvest::default());
    }
}
