use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::metrics::QueueMetrics;

use super::queue::{DeliveryJob, QueueError, WorkQueue};

/// In-process work queue on a bounded tokio channel.
///
/// Jobs are lost on restart; the dispatch sweep re-feeds anything still
/// pending.
pub struct MemoryWorkQueue {
    sender: mpsc::Sender<DeliveryJob>,
    receiver: Mutex<mpsc::Receiver<DeliveryJob>>,
    poll_timeout: Duration,
}

impl MemoryWorkQueue {
    pub fn new(capacity: usize, poll_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            poll_timeout,
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
        let result = self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        });

        match &result {
            Ok(()) => QueueMetrics::record_enqueued("memory"),
            Err(_) => QueueMetrics::record_enqueue_failed("memory"),
        }
        result
    }

    async fn dequeue(&self) -> Result<Option<DeliveryJob>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(self.poll_timeout, receiver.recv()).await {
            Ok(Some(job)) => Ok(Some(job)),
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.sender.max_capacity() - self.sender.capacity())
    }
}
