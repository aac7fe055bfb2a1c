//! Delivery worker.
//!
//! - `DeliveryWorker`: per-delivery state machine driver
//! - `WorkQueue`: at-least-once hand-off (memory or Redis list)
//! - `WorkerPool`: consumer loops with task-level retry

mod backoff;
mod memory_queue;
mod pool;
mod processor;
mod queue;
mod redis_queue;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use memory_queue::MemoryWorkQueue;
pub use pool::WorkerPool;
pub use processor::{DeliveryWorker, ProcessOutcome, SkipReason};
pub use queue::{create_work_queue, DeliveryJob, QueueError, WorkQueue};
pub use redis_queue::RedisWorkQueue;

use thiserror::Error;

use crate::store::StoreError;

/// Infrastructure failures while processing a delivery. Transport failures
/// are not errors: they are recorded on the delivery.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
