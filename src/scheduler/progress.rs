//! Background progress monitor for a generation run.
//!
//! The tick loop bumps shared counters; a separate task logs a summary line
//! at a fixed interval so long runs can be followed without reading every
//! per-request log line.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use super::harvester::Harvest;

/// Snapshot of run counters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub dispatched: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub written: usize,
    pub published: usize,
    pub in_flight: usize,
    pub elapsed: Duration,
}

/// Shared atomic counters for run progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounters {
    /// Requests spawned.
    pub dispatched: Arc<AtomicUsize>,
    /// Requests that produced a record.
    pub succeeded: Arc<AtomicUsize>,
    /// Requests whose extraction was empty.
    pub empty: Arc<AtomicUsize>,
    /// Requests that failed or panicked.
    pub failed: Arc<AtomicUsize>,
    /// Records appended to the active batch.
    pub written: Arc<AtomicUsize>,
    /// Batches uploaded.
    pub published: Arc<AtomicUsize>,
    /// Tasks currently tracked by the loop. A gauge, not a running total.
    pub in_flight: Arc<AtomicUsize>,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a harvest into the counters.
    pub fn record_harvest(&self, harvest: &Harvest) {
        self.succeeded
            .fetch_add(harvest.records.len(), Ordering::Relaxed);
        self.empty.fetch_add(harvest.empty, Ordering::Relaxed);
        self.failed.fetch_add(harvest.failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs run progress.
///
/// Call [`ProgressMonitor::stop`] to cancel; dropping it also stops the loop
/// at its next wake-up.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    pub fn start(counters: ProgressCounters, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let elapsed_secs = snap.elapsed.as_secs_f64();
                let records_per_min = if elapsed_secs > 0.0 {
                    snap.written as f64 / elapsed_secs * 60.0
                } else {
                    0.0
                };
                let resolved = snap.succeeded + snap.empty + snap.failed;
                let failure_pct = if resolved > 0 {
                    snap.failed as f64 / resolved as f64 * 100.0
                } else {
                    0.0
                };

                tracing::info!(
                    dispatched = snap.dispatched,
                    succeeded = snap.succeeded,
                    empty = snap.empty,
                    failed = snap.failed,
                    written = snap.written,
                    published = snap.published,
                    in_flight = snap.in_flight,
                    elapsed_secs = snap.elapsed.as_secs(),
                    records_per_min = format!("{:.1}", records_per_min),
                    failure_pct = format!("{:.1}%", failure_pct),
                    "Generation progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}
