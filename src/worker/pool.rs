use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::metrics::QueueMetrics;

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::processor::DeliveryWorker;
use super::queue::{DeliveryJob, WorkQueue};

/// Consumer loops draining the work queue into the delivery worker.
///
/// Infrastructure failures re-enqueue the job after an exponential backoff,
/// up to `task_max_retries` times. This outer retry is independent of the
/// delivery's own `retry_count`.
pub struct WorkerPool {
    worker: Arc<DeliveryWorker>,
    queue: Arc<dyn WorkQueue>,
    backoff: ExponentialBackoff,
    task_max_retries: u32,
    consumers: usize,
}

impl WorkerPool {
    pub fn new(worker: Arc<DeliveryWorker>, queue: Arc<dyn WorkQueue>, config: &QueueConfig) -> Self {
        let backoff = ExponentialBackoff::with_config(BackoffConfig {
            initial_delay_ms: config.task_retry_initial_delay_ms,
            ..Default::default()
        });

        Self {
            worker,
            queue,
            backoff,
            task_max_retries: config.task_max_retries,
            consumers: config.workers.max(1),
        }
    }

    /// Spawn the consumer loops. Each stops on the shutdown signal after
    /// finishing the job it is processing.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let pool = Arc::new(self);

        tracing::info!(
            consumers = pool.consumers,
            backend = pool.queue.backend_name(),
            task_max_retries = pool.task_max_retries,
            "Worker pool started"
        );

        (0..pool.consumers)
            .map(|index| {
                let pool = pool.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(async move { pool.run_consumer(index, shutdown).await })
            })
            .collect()
    }

    async fn run_consumer(&self, index: usize, mut shutdown: broadcast::Receiver<()>) {
        // `dequeue` is never raced against shutdown: a BRPOP dropped after
        // popping would lose the job. Shutdown waits at most one poll timeout.
        while matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            match self.queue.dequeue().await {
                Ok(Some(job)) => self.handle_job(job).await,
                Ok(None) => {}
                Err(e) => {
                    let delay = self.backoff.delay_for(1);
                    tracing::warn!(
                        consumer = index,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to dequeue delivery job"
                    );
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::debug!(consumer = index, "Worker stopped");
    }

    /// Process one job, scheduling a task-level retry on infrastructure
    /// failure.
    pub async fn handle_job(&self, job: DeliveryJob) {
        match self.worker.process_delivery(job.delivery_id).await {
            Ok(outcome) => {
                tracing::debug!(delivery_id = %job.delivery_id, ?outcome, "Delivery job done");
            }
            Err(e) if job.attempt < self.task_max_retries => {
                let retry = job.next_attempt();
                let delay = self.backoff.delay_for(retry.attempt);
                QueueMetrics::record_task_retry();
                tracing::warn!(
                    delivery_id = %job.delivery_id,
                    attempt = retry.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery job failed, re-enqueueing"
                );

                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue(retry).await {
                        tracing::error!(
                            delivery_id = %retry.delivery_id,
                            error = %e,
                            "Failed to re-enqueue delivery job"
                        );
                    }
                });
            }
            Err(e) => {
                // Delivery stays pending; the dispatch sweep picks it up
                QueueMetrics::record_task_dropped();
                tracing::error!(
                    delivery_id = %job.delivery_id,
                    attempts = job.attempt + 1,
                    error = %e,
                    "Delivery job failed, task retries exhausted"
                );
            }
        }
    }
}
