//! Redis list work queue.
//!
//! Jobs are JSON documents pushed with `LPUSH` and popped with `BRPOP`, so
//! the list behaves as a FIFO shared by every worker process. A job popped
//! by a process that crashes before finishing is lost from the list; the
//! delivery stays `Pending` and the dispatch sweep picks it up again.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use crate::metrics::QueueMetrics;

use super::queue::{DeliveryJob, QueueError, WorkQueue};

pub struct RedisWorkQueue {
    /// Shared connection for pushes and length queries
    conn: ConnectionManager,
    /// Dedicated connection for blocking pops
    blocking: Mutex<ConnectionManager>,
    key: String,
    poll_timeout: Duration,
}

impl RedisWorkQueue {
    pub async fn connect(url: &str, key: String, poll_timeout: Duration) -> Result<Self, QueueError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            key,
            poll_timeout,
        })
    }

    fn encode(job: &DeliveryJob) -> Result<String, QueueError> {
        Ok(serde_json::to_string(job)?)
    }

    fn decode(payload: &str) -> Result<DeliveryJob, QueueError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
        let payload = Self::encode(&job)?;
        let mut conn = self.conn.clone();

        match conn.lpush::<_, _, ()>(&self.key, payload).await {
            Ok(()) => {
                QueueMetrics::record_enqueued("redis");
                Ok(())
            }
            Err(e) => {
                QueueMetrics::record_enqueue_failed("redis");
                Err(e.into())
            }
        }
    }

    async fn dequeue(&self) -> Result<Option<DeliveryJob>, QueueError> {
        let mut conn = self.blocking.lock().await;
        let popped: Option<(String, String)> = conn
            .brpop(&self.key, self.poll_timeout.as_secs_f64())
            .await?;

        match popped {
            Some((_, payload)) => match Self::decode(&payload) {
                Ok(job) => Ok(Some(job)),
                Err(e) => {
                    // Drop the poison message rather than blocking the queue
                    tracing::error!(error = %e, payload = %payload, "Discarding malformed delivery job");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.key).await?;
        Ok(len)
    }
}
