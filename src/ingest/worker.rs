use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::coordinator::Ingestor;

/// Outcome of [`IngestHandle::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A run was enqueued
    Queued,
    /// A run is already waiting to start; this request was merged into it
    AlreadyPending,
    /// The worker has shut down
    Stopped,
}

/// State of the most recent ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub runs: u64,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Articles inserted by the last finished run
    pub inserted: Option<usize>,
    /// Error message of the last finished run, if it failed
    pub error: Option<String>,
}

/// Background task that owns an [`Ingestor`] and runs it on request or on a
/// fixed schedule.
pub struct IngestWorker {
    ingestor: Ingestor,
    requests: mpsc::Receiver<()>,
    stop: oneshot::Receiver<()>,
    report: watch::Sender<IngestReport>,
    schedule: Option<Interval>,
}

impl IngestWorker {
    /// Starts the worker on the current Tokio runtime.
    ///
    /// With `every` set, a run is also started each time the period elapses
    /// (the first one period after spawning).
    pub fn spawn(ingestor: Ingestor, every: Option<Duration>) -> IngestHandle {
        // One slot: a second request while one is waiting coalesces with it.
        let (request_tx, requests) = mpsc::channel(1);
        let (stop_tx, stop) = oneshot::channel();
        let (report, report_rx) = watch::channel(IngestReport::default());

        // A period too large to schedule behaves like manual-only mode.
        let schedule = every.filter(|p| !p.is_zero()).and_then(|period| {
            let Some(first) = Instant::now().checked_add(period) else {
                tracing::warn!(?period, "Refresh interval out of range, schedule disabled");
                return None;
            };
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        });

        let worker = Self {
            ingestor,
            requests,
            stop,
            report,
            schedule,
        };
        let task = tokio::spawn(worker.run());

        IngestHandle {
            requests: request_tx,
            report: report_rx,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    async fn run(mut self) {
        tracing::debug!(scheduled = self.schedule.is_some(), "Ingest worker started");
        loop {
            let reason = tokio::select! {
                biased;
                _ = &mut self.stop => break,
                request = self.requests.recv() => match request {
                    Some(()) => "manual",
                    None => break,
                },
                _ = next_tick(&mut self.schedule) => "scheduled",
            };
            self.run_once(reason).await;
        }
        tracing::debug!("Ingest worker stopped");
    }

    async fn run_once(&self, reason: &'static str) {
        self.report.send_modify(|r| {
            r.running = true;
            r.started_at = Some(Utc::now());
        });
        tracing::info!(reason, "Ingestion run started");

        let result = self.ingestor.ingest().await;

        match &result {
            Ok(inserted) => tracing::info!(reason, inserted, "Ingestion run finished"),
            Err(e) => tracing::error!(reason, error = %e, "Ingestion run failed"),
        }
        self.report.send_modify(|r| {
            r.runs += 1;
            r.running = false;
            r.finished_at = Some(Utc::now());
            match result {
                Ok(inserted) => {
                    r.inserted = Some(inserted);
                    r.error = None;
                }
                Err(e) => {
                    r.inserted = None;
                    r.error = Some(e.to_string());
                }
            }
        });
    }
}

async fn next_tick(schedule: &mut Option<Interval>) {
    match schedule {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Control handle for a running [`IngestWorker`].
pub struct IngestHandle {
    requests: mpsc::Sender<()>,
    report: watch::Receiver<IngestReport>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl IngestHandle {
    /// Requests a run without waiting for it.
    pub fn trigger(&self) -> Trigger {
        match self.requests.try_send(()) {
            Ok(()) => Trigger::Queued,
            Err(mpsc::error::TrySendError::Full(())) => Trigger::AlreadyPending,
            Err(mpsc::error::TrySendError::Closed(())) => Trigger::Stopped,
        }
    }

    pub fn last_report(&self) -> IngestReport {
        self.report.borrow().clone()
    }

    /// A receiver that is notified whenever the report changes.
    pub fn subscribe(&self) -> watch::Receiver<IngestReport> {
        self.report.clone()
    }

    /// Waits until at least `runs` runs have finished and returns the report.
    /// Returns `None` if the worker stops first.
    pub async fn wait_for_runs(&self, runs: u64) -> Option<IngestReport> {
        let mut rx = self.report.clone();
        let report = rx.wait_for(|r| r.runs >= runs).await.ok()?.clone();
        Some(report)
    }

    /// Stops the worker and waits for it to exit. A run in progress is
    /// finished first; a queued one is dropped. Calling this twice is a no-op.
    pub async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Ingest worker task ended abnormally");
            }
        }
    }
}
