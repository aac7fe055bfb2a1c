//! Delivery work queue.
//!
//! Hand-off between the composer/scheduler and the worker pool. Delivery is
//! at-least-once: a job may be seen more than once, and the worker's
//! idempotency guard makes repeats harmless.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{QueueBackend, QueueConfig};

use super::memory_queue::MemoryWorkQueue;
use super::redis_queue::RedisWorkQueue;

/// Errors that can occur during work queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Work queue is closed")]
    Closed,

    #[error("Work queue is full")]
    Full,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One request to process a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub delivery_id: Uuid,
    /// Task-level invocation count, starting at 0
    #[serde(default)]
    pub attempt: u32,
}

impl DeliveryJob {
    pub fn new(delivery_id: Uuid) -> Self {
        Self {
            delivery_id,
            attempt: 0,
        }
    }

    /// The same job, scheduled for its next task-level re-invocation
    pub fn next_attempt(&self) -> Self {
        Self {
            delivery_id: self.delivery_id,
            attempt: self.attempt + 1,
        }
    }
}

/// Backend trait for the delivery work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError>;

    /// Wait up to the configured poll timeout for a job. `Ok(None)` means
    /// nothing arrived in time.
    async fn dequeue(&self) -> Result<Option<DeliveryJob>, QueueError>;

    /// Jobs currently waiting
    async fn len(&self) -> Result<usize, QueueError>;
}

/// Create a work queue based on configuration.
///
/// A Redis queue that cannot connect falls back to memory.
pub async fn create_work_queue(settings: &QueueConfig) -> Arc<dyn WorkQueue> {
    match settings.backend {
        QueueBackend::Redis => {
            match RedisWorkQueue::connect(
                &settings.redis_url,
                settings.redis_key.clone(),
                settings.poll_timeout(),
            )
            .await
            {
                Ok(queue) => {
                    tracing::info!(
                        backend = "redis",
                        key = %settings.redis_key,
                        "Creating Redis work queue"
                    );
                    Arc::new(queue)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Redis work queue unavailable, falling back to memory"
                    );
                    Arc::new(MemoryWorkQueue::new(settings.capacity, settings.poll_timeout()))
                }
            }
        }
        QueueBackend::Memory => {
            tracing::info!(
                backend = "memory",
                capacity = settings.capacity,
                "Creating memory work queue"
            );
            Arc::new(MemoryWorkQueue::new(settings.capacity, settings.poll_timeout()))
        }
    }
}
