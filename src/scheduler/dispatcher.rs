//! Per-tick fan-out of one request per credential.

use std::sync::Arc;

use crate::error::PassageError;
use crate::llm::{Credential, LlmProvider, SamplingParams};

use super::selector::Selector;
use super::task::{GenerationTask, TaskSet};

/// Spawns new generation tasks, one per credential per tick.
///
/// The dispatcher never waits for earlier tasks; a slow credential simply
/// accumulates more outstanding requests unless a cap is configured.
pub struct Dispatcher {
    credentials: Vec<Credential>,
    selector: Selector,
    provider: Arc<dyn LlmProvider>,
    sampling: SamplingParams,
    max_in_flight: Option<usize>,
}

impl Dispatcher {
    pub fn new(
        credentials: Vec<Credential>,
        selector: Selector,
        provider: Arc<dyn LlmProvider>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            credentials,
            selector,
            provider,
            sampling,
            max_in_flight: None,
        }
    }

    /// Skip a credential while it has `limit` tasks in the set.
    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit;
        self
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Spawn one task per credential, in configuration order.
    ///
    /// A credential at its in-flight cap is skipped and no passage is drawn
    /// for it. Returns the number of tasks spawned.
    pub fn dispatch(&mut self, tasks: &mut TaskSet) -> Result<usize, PassageError> {
        let mut spawned = 0;
        for credential in &self.credentials {
            if let Some(limit) = self.max_in_flight {
                let in_flight = tasks.in_flight_for(credential);
                if in_flight >= limit {
                    tracing::debug!(
                        credential = %credential,
                        in_flight,
                        "Credential at in-flight cap, skipping"
                    );
                    continue;
                }
            }

            let selection = self.selector.select()?;
            let id = tasks.spawn(
                GenerationTask::new(credential.clone(), selection.template, selection.passage),
                Arc::clone(&self.provider),
                self.sampling,
            );
            tracing::trace!(task = %id, credential = %credential, "Dispatched request");
            spawned += 1;
        }
        Ok(spawned)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("credentials", &self.credentials)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}
