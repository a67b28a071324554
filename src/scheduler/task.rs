//! Generation tasks and the arena that tracks them while they are in flight.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

use crate::error::{LlmError, TemplateError};
use crate::llm::{Credential, GenerationRequest, LlmProvider, SamplingParams};
use crate::template::PromptTemplate;

/// Stable identifier of a task inside a [`TaskSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Why a single generation task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("generation error: {0}")]
    Generation(#[from] LlmError),
}

/// Result of one resolved task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Extraction finished. An empty `text` means there is nothing to write.
    Succeeded { text: String },
    /// Rendering, the request or extraction failed.
    Failed {
        credential: Credential,
        error: TaskError,
    },
}

/// One request: a template applied to a passage, sent with one credential.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub credential: Credential,
    pub template: Arc<PromptTemplate>,
    pub passage: String,
}

impl GenerationTask {
    pub fn new(credential: Credential, template: Arc<PromptTemplate>, passage: String) -> Self {
        Self {
            credential,
            template,
            passage,
        }
    }

    /// Render, request and extract. Errors are captured in the outcome.
    pub async fn execute(
        self,
        provider: Arc<dyn LlmProvider>,
        sampling: SamplingParams,
    ) -> TaskOutcome {
        let credential = self.credential.clone();
        match self.run(provider.as_ref(), sampling).await {
            Ok(text) => TaskOutcome::Succeeded { text },
            Err(error) => TaskOutcome::Failed { credential, error },
        }
    }

    async fn run(
        self,
        provider: &dyn LlmProvider,
        sampling: SamplingParams,
    ) -> Result<String, TaskError> {
        let prompt = self.template.render(&self.passage)?;
        let request = GenerationRequest::new(prompt, self.credential, sampling);
        let raw = provider.generate(request).await?;
        Ok(self.template.extract(&raw)?)
    }
}

/// A task taken out of the set once its handle finished.
#[derive(Debug)]
pub struct ResolvedTask {
    pub id: TaskId,
    pub template: String,
    pub credential: Credential,
    /// `Err` when the task panicked or was cancelled.
    pub result: Result<TaskOutcome, JoinError>,
}

#[derive(Debug)]
struct LiveTask {
    credential: Credential,
    template: String,
    handle: JoinHandle<TaskOutcome>,
}

/// Arena of spawned tasks keyed by [`TaskId`].
///
/// Owned by the tick loop; nothing else touches it, so no locking is needed.
#[derive(Debug, Default)]
pub struct TaskSet {
    next_id: u64,
    live: BTreeMap<TaskId, LiveTask>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the runtime and start tracking it.
    pub fn spawn(
        &mut self,
        task: GenerationTask,
        provider: Arc<dyn LlmProvider>,
        sampling: SamplingParams,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let credential = task.credential.clone();
        let template = task.template.name.clone();
        let handle = tokio::spawn(task.execute(provider, sampling));
        self.live.insert(
            id,
            LiveTask {
                credential,
                template,
                handle,
            },
        );
        id
    }

    /// Number of tasks not yet harvested.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Tasks still waiting on their request.
    pub fn pending(&self) -> usize {
        self.live
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    /// Pending tasks bound to `credential`. Finished but unharvested tasks
    /// do not count.
    pub fn in_flight_for(&self, credential: &Credential) -> usize {
        self.live
            .values()
            .filter(|task| &task.credential == credential && !task.handle.is_finished())
            .count()
    }

    /// Remove and return every finished task, leaving pending ones in place.
    pub fn take_finished(&mut self) -> Vec<ResolvedTask> {
        let finished: Vec<TaskId> = self
            .live
            .iter()
            .filter(|(_, task)| task.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        let mut resolved = Vec::with_capacity(finished.len());
        for id in finished {
            let Some(mut task) = self.live.remove(&id) else {
                continue;
            };
            match (&mut task.handle).now_or_never() {
                Some(result) => resolved.push(ResolvedTask {
                    id,
                    template: task.template,
                    credential: task.credential,
                    result,
                }),
                // Not observable yet; try again next tick.
                None => {
                    self.live.insert(id, task);
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::template::ExtractRule;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider replying with a fixed answer, or an error when `reply` is `None`.
    pub(crate) struct FixedProvider {
        pub reply: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FixedProvider {
        pub(crate) fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| LlmError::ApiError {
                code: 500,
                message: "boom".to_string(),
            })
        }
    }

    pub(crate) fn section_template(tag: &str) -> Arc<PromptTemplate> {
        Arc::new(PromptTemplate::new(
            "lecture",
            "text",
            "Teach <passage>{{ passage }}</passage>",
            ExtractRule::Section {
                tag: tag.to_string(),
            },
        ))
    }

    pub(crate) fn sampling() -> SamplingParams {
        SamplingParams::new(1.0, 0.99).unwrap()
    }

    pub(crate) async fn settle(tasks: &TaskSet) {
        while tasks.pending() > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let provider = FixedProvider::ok("<lecture> hello </lecture>");
        let task = GenerationTask::new(
            Credential::new("k"),
            section_template("lecture"),
            "p".to_string(),
        );
        let outcome = task.execute(provider.clone(), sampling()).await;
        assert!(matches!(outcome, TaskOutcome::Succeeded { text } if text == "hello"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_captures_request_error() {
        let task = GenerationTask::new(
            Credential::new("k"),
            section_template("lecture"),
            "p".to_string(),
        );
        let outcome = task.execute(FixedProvider::failing(), sampling()).await;
        match outcome {
            TaskOutcome::Failed { credential, error } => {
                assert_eq!(credential, Credential::new("k"));
                assert!(matches!(error, TaskError::Generation(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_captures_missing_tag() {
        let task = GenerationTask::new(
            Credential::new("k"),
            section_template("lecture"),
            "p".to_string(),
        );
        let outcome = task
            .execute(FixedProvider::ok("no tags here"), sampling())
            .await;
        assert!(matches!(
            outcome,
            TaskOutcome::Failed {
                error: TaskError::Template(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_task_set_tracks_and_releases() {
        let provider: Arc<dyn LlmProvider> = FixedProvider::ok("<lecture>x</lecture>");
        let mut tasks = TaskSet::new();
        let a = Credential::new("a");
        let b = Credential::new("b");

        let first = tasks.spawn(
            GenerationTask::new(a.clone(), section_template("lecture"), "1".into()),
            provider.clone(),
            sampling(),
        );
        let second = tasks.spawn(
            GenerationTask::new(a.clone(), section_template("lecture"), "2".into()),
            provider.clone(),
            sampling(),
        );
        tasks.spawn(
            GenerationTask::new(b.clone(), section_template("lecture"), "3".into()),
            provider,
            sampling(),
        );
        assert_ne!(first, second);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks.in_flight_for(&a), 2);
        assert_eq!(tasks.in_flight_for(&b), 1);

        settle(&tasks).await;
        assert_eq!(tasks.in_flight_for(&a), 0);
        assert_eq!(tasks.len(), 3);
        let resolved = tasks.take_finished();
        assert_eq!(resolved.len(), 3);
        assert!(tasks.is_empty());
        assert!(resolved.iter().all(|r| r.result.is_ok()));
        assert!(tasks.take_finished().is_empty());
    }

    #[tokio::test]
    async fn test_pending_tasks_stay_in_set() {
        struct Never;

        #[async_trait]
        impl LlmProvider for Never {
            async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmError> {
                std::future::pending().await
            }
        }

        let mut tasks = TaskSet::new();
        tasks.spawn(
            GenerationTask::new(Credential::new("k"), section_template("x"), "p".into()),
            Arc::new(Never),
            sampling(),
        );
        tokio::task::yield_now().await;

        assert!(tasks.take_finished().is_empty());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.pending(), 1);
    }
}
