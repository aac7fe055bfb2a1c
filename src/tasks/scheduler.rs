use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::metrics::SweepMetrics;
use crate::store::NotificationStore;
use crate::worker::{DeliveryWorker, ProcessOutcome, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    Dispatch,
    Retry,
    Cleanup,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [SweepKind::Dispatch, SweepKind::Retry, SweepKind::Cleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Dispatch => "dispatch",
            SweepKind::Retry => "retry",
            SweepKind::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of one sweep pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweep: SweepKind,
    /// Records returned by the selection query
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Infrastructure errors, including a failed selection query
    pub errors: usize,
    pub purged: u64,
}

impl SweepReport {
    fn new(sweep: SweepKind) -> Self {
        Self {
            sweep,
            selected: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            errors: 0,
            purged: 0,
        }
    }

    fn tally(&mut self, outcome: &Result<ProcessOutcome, WorkerError>) {
        match outcome {
            Ok(ProcessOutcome::Sent) => self.sent += 1,
            Ok(ProcessOutcome::Failed { .. }) => self.failed += 1,
            Ok(ProcessOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }

    fn record_metrics(&self, elapsed: Duration) {
        let sweep = self.sweep.as_str();
        SweepMetrics::record_items(sweep, "sent", self.sent as u64);
        SweepMetrics::record_items(sweep, "failed", self.failed as u64);
        SweepMetrics::record_items(sweep, "skipped", self.skipped as u64);
        SweepMetrics::record_items(sweep, "error", self.errors as u64);
        SweepMetrics::record_duration(sweep, elapsed.as_secs_f64());
        if self.purged > 0 {
            SweepMetrics::record_purged(self.purged);
        }
    }
}

/// Periodic recovery sweeps over the store.
///
/// Every sweep is idempotent: the worker's compare-and-swap on `Pending`
/// makes overlapping passes, or a pass racing a queue consumer, harmless.
/// A sweep never returns an error; failures are counted in its report.
pub struct Scheduler {
    store: Arc<dyn NotificationStore>,
    worker: Arc<DeliveryWorker>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(worker: Arc<DeliveryWorker>, config: SchedulerConfig) -> Self {
        Self {
            store: worker.store().clone(),
            worker,
            config,
        }
    }

    pub async fn run_sweep(&self, kind: SweepKind) -> SweepReport {
        match kind {
            SweepKind::Dispatch => self.dispatch_sweep().await,
            SweepKind::Retry => self.retry_sweep().await,
            SweepKind::Cleanup => self.cleanup_sweep().await,
        }
    }

    /// Process deliveries still `Pending`, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_sweep(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(SweepKind::Dispatch);

        let pending = match self
            .store
            .pending_deliveries(self.config.dispatch_batch_size)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return self.selection_failed(report, start, e),
        };
        report.selected = pending.len();

        let ids: Vec<Uuid> = pending.iter().map(|d| d.id).collect();
        for outcome in self.process_all(ids).await {
            report.tally(&outcome);
        }

        self.finish(report, start)
    }

    /// Return due `Failed` deliveries to `Pending` and process them again.
    #[tracing::instrument(skip(self))]
    pub async fn retry_sweep(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(SweepKind::Retry);
        let now = Utc::now();

        let due = match self
            .store
            .retryable_deliveries(now, self.config.retry_batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => return self.selection_failed(report, start, e),
        };
        report.selected = due.len();

        let mut reset = Vec::with_capacity(due.len());
        for delivery in &due {
            match self.store.reset_for_retry(delivery.id, now).await {
                Ok(true) => reset.push(delivery.id),
                Ok(false) => {
                    tracing::debug!(delivery_id = %delivery.id, "Delivery no longer due, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(delivery_id = %delivery.id, error = %e, "Failed to reset delivery for retry");
                    report.errors += 1;
                }
            }
        }

        for outcome in self.process_all(reset).await {
            report.tally(&outcome);
        }

        self.finish(report, start)
    }

    /// Delete read notifications older than the retention window.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_sweep(&self) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::new(SweepKind::Cleanup);
        let cutoff = Utc::now() - self.config.retention();

        match self.store.delete_read_before(cutoff).await {
            Ok(purged) => {
                report.selected = purged as usize;
                report.purged = purged;
            }
            Err(e) => return self.selection_failed(report, start, e),
        }

        self.finish(report, start)
    }

    async fn process_all(&self, ids: Vec<Uuid>) -> Vec<Result<ProcessOutcome, WorkerError>> {
        let concurrency = self.config.concurrency.max(1);
        stream::iter(ids)
            .map(|id| async move {
                let outcome = self.worker.process_delivery(id).await;
                if let Err(e) = &outcome {
                    tracing::warn!(delivery_id = %id, error = %e, "Delivery processing failed");
                }
                outcome
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    fn selection_failed(
        &self,
        mut report: SweepReport,
        start: Instant,
        error: impl fmt::Display,
    ) -> SweepReport {
        tracing::error!(sweep = %report.sweep, error = %error, "Sweep selection failed");
        SweepMetrics::record_error(report.sweep.as_str());
        report.errors += 1;
        self.finish(report, start)
    }

    fn finish(&self, report: SweepReport, start: Instant) -> SweepReport {
        let elapsed = start.elapsed();
        report.record_metrics(elapsed);

        if report.selected > 0 || report.errors > 0 {
            tracing::info!(
                sweep = %report.sweep,
                selected = report.selected,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors,
                purged = report.purged,
                duration_ms = elapsed.as_millis() as u64,
                "Sweep completed"
            );
        } else {
            tracing::debug!(sweep = %report.sweep, "Sweep found nothing to do");
        }
        report
    }

    fn interval_for(&self, kind: SweepKind) -> Duration {
        let secs = match kind {
            SweepKind::Dispatch => self.config.dispatch_interval_seconds,
            SweepKind::Retry => self.config.retry_interval_seconds,
            SweepKind::Cleanup => self.config.cleanup_interval_seconds,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Start one loop per sweep. Loops are independent so a slow cleanup
    /// never delays dispatch.
    pub fn spawn(self: Arc<Self>, shutdown: &broadcast::Sender<()>) -> SchedulerHandle {
        let handles = SweepKind::ALL
            .into_iter()
            .map(|kind| {
                let scheduler = self.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { scheduler.run(kind, shutdown).await })
            })
            .collect();

        tracing::info!(
            dispatch_interval_secs = self.config.dispatch_interval_seconds,
            retry_interval_secs = self.config.retry_interval_seconds,
            cleanup_interval_secs = self.config.cleanup_interval_seconds,
            retention_days = self.config.retention_days,
            "Scheduler started"
        );

        SchedulerHandle { handles }
    }

    async fn run(&self, kind: SweepKind, mut shutdown: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval_for(kind));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Dispatch runs at startup to pick up work left pending by a previous process
        if kind != SweepKind::Dispatch {
            timer.tick().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(sweep = %kind, "Sweep loop received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.run_sweep(kind).await;
                }
            }
        }

        tracing::info!(sweep = %kind, "Sweep loop stopped");
    }
}

/// Join handles of the running sweep loops
pub struct SchedulerHandle {
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Wait for every loop to exit after shutdown has been signalled
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sweep loop panicked");
            }
        }
    }
}
