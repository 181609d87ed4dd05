//! Recurring sync work and the scheduler boundary.
//!
//! The tracker owns no scheduler. It exposes one unit of work,
//! [`SyncWorker::run_once`], whose [`WorkOutcome`] maps onto whatever
//! success/retry vocabulary the host's job system has. Hosts without one can
//! use [`spawn_periodic`].

use crate::collector::DataCollector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOutcome {
    /// Synced, or skipped because permission is missing.
    Success,
    /// The pass failed; the host should retry with its own backoff.
    Retry,
}

impl WorkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOutcome::Success => "success",
            WorkOutcome::Retry => "retry",
        }
    }
}

impl std::fmt::Display for WorkOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Permission-gated sync job for one collector.
///
/// Safe to run concurrently or redundantly; the collector's engine coalesces
/// overlapping passes.
#[derive(Clone)]
pub struct SyncWorker {
    name: String,
    collector: Arc<dyn DataCollector>,
}

impl SyncWorker {
    /// Create a worker. `name` identifies the job to the host scheduler.
    pub fn new(name: impl Into<String>, collector: Arc<dyn DataCollector>) -> Self {
        Self { name: name.into(), collector }
    }

    /// Unique job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one unit of recurring work.
    ///
    /// Missing permission is a successful no-op, not a failure.
    pub async fn run_once(&self) -> WorkOutcome {
        let metric = self.collector.metric_type();

        let permission = self.collector.check_permissions().await;
        let outcome = if !permission.is_granted() {
            debug!(job = %self.name, ?permission, "Permission not granted, skipping sync");
            WorkOutcome::Success
        } else {
            match self.collector.sync().await {
                Ok(()) => WorkOutcome::Success,
                Err(e) => {
                    warn!(job = %self.name, error = %e, "Sync failed, requesting retry");
                    WorkOutcome::Retry
                }
            }
        };

        metrics::counter!(
            "tracker_worker_runs_total",
            "metric" => metric.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        outcome
    }
}

/// Run `worker` every `interval` until `shutdown` fires or its sender drops.
///
/// The first run starts immediately. Ticks missed while a run is in progress
/// are skipped rather than queued.
pub fn spawn_periodic(
    worker: SyncWorker,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(job = %worker.name(), interval_secs = interval.as_secs(), "Starting periodic sync");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = worker.run_once().await;
                    debug!(job = %worker.name(), %outcome, "Periodic sync run finished");
                }
                _ = shutdown.recv() => {
                    info!(job = %worker.name(), "Stopping periodic sync");
                    break;
                }
            }
        }
    })
}
