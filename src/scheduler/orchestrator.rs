//! The tick loop tying dispatch, harvest, output and publication together.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::RunError;
use crate::export::{BatchSink, FinishedBatch, OutputRecord, Publisher};

use super::dispatcher::Dispatcher;
use super::harvester::{Harvest, Harvester};
use super::progress::ProgressCounters;
use super::task::TaskSet;

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub dispatched: usize,
    pub harvest: Harvest,
    pub finished: Vec<FinishedBatch>,
}

/// Owns every piece of run state and drives the tick loop.
///
/// Phases never overlap: dispatch, then harvest, then writing (with any
/// rotation and publication), then the pause. Publication blocks the loop,
/// so no new request is dispatched while an upload is being retried.
pub struct Orchestrator {
    dispatcher: Dispatcher,
    tasks: TaskSet,
    harvester: Harvester,
    sink: BatchSink,
    publisher: Option<Publisher>,
    counters: ProgressCounters,
    tick_interval: Duration,
}

impl Orchestrator {
    /// Without a publisher, finished batches stay in the output directory.
    pub fn new(
        dispatcher: Dispatcher,
        harvester: Harvester,
        sink: BatchSink,
        publisher: Option<Publisher>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            tasks: TaskSet::new(),
            harvester,
            sink,
            publisher,
            counters: ProgressCounters::new(),
            tick_interval,
        }
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn sink(&self) -> &BatchSink {
        &self.sink
    }

    /// Finalize a resumed active batch that is already at its target size.
    pub async fn startup(&mut self) -> Result<Option<FinishedBatch>, RunError> {
        if !self.sink.is_full() {
            return Ok(None);
        }
        tracing::info!(
            records = self.sink.len(),
            target = self.sink.target(),
            "Resumed batch is already full, finalizing before dispatch"
        );
        let batch = self.sink.rotate()?;
        self.publish(&batch).await;
        Ok(Some(batch))
    }

    /// Spawn this tick's requests.
    pub fn dispatch(&mut self) -> Result<usize, RunError> {
        let spawned = self.dispatcher.dispatch(&mut self.tasks)?;
        self.counters
            .dispatched
            .fetch_add(spawned, Ordering::Relaxed);
        self.counters
            .in_flight
            .store(self.tasks.len(), Ordering::Relaxed);
        Ok(spawned)
    }

    /// Harvest resolved tasks, write their records, and rotate and publish
    /// whenever the active batch fills up.
    pub async fn collect(&mut self) -> Result<(Harvest, Vec<FinishedBatch>), RunError> {
        let harvest = self.harvester.harvest(&mut self.tasks);
        self.counters.record_harvest(&harvest);
        self.counters
            .in_flight
            .store(self.tasks.len(), Ordering::Relaxed);

        let mut finished = Vec::new();
        for text in &harvest.records {
            let rotated = self.sink.append(&OutputRecord::new(text.as_str()))?;
            self.counters.written.fetch_add(1, Ordering::Relaxed);
            if let Some(batch) = rotated {
                self.publish(&batch).await;
                finished.push(batch);
            }
        }
        Ok((harvest, finished))
    }

    /// One dispatch followed by one collection.
    pub async fn tick(&mut self) -> Result<TickReport, RunError> {
        let dispatched = self.dispatch()?;
        let (harvest, finished) = self.collect().await?;
        Ok(TickReport {
            dispatched,
            harvest,
            finished,
        })
    }

    /// Run ticks until `shutdown` resolves or a fatal error occurs.
    ///
    /// Requests still in flight at shutdown are abandoned; everything already
    /// written stays in the active batch for the next run.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), RunError>
    where
        F: Future<Output = ()>,
    {
        self.startup().await?;
        tokio::pin!(shutdown);

        loop {
            self.tick().await?;
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(
                        in_flight = self.tasks.len(),
                        active_records = self.sink.len(),
                        "Shutting down"
                    );
                    return Ok(());
                }
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
        }
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<(), RunError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    async fn publish(&mut self, batch: &FinishedBatch) {
        match self.publisher.as_mut() {
            Some(publisher) => {
                publisher.publish(batch).await;
                self.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            None => tracing::warn!(
                path = %batch.path.display(),
                "Publishing disabled, batch kept locally"
            ),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("dispatcher", &self.dispatcher)
            .field("in_flight", &self.tasks.len())
            .field("sink", &self.sink)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}
