use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use uuid::Uuid;

use crate::metrics::DeliveryMetrics;
use crate::notification::{
    Channel, DeliveryStatus, DeliveryUpdate, Notification, NotificationDelivery,
};
use crate::store::NotificationStore;
use crate::template::EmailTemplates;
use crate::transport::{EmailMessage, EmailTransport, PushMessage, PushTransport};

use super::WorkerError;

/// Result of one `process_delivery` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Sent,
    Failed {
        /// `false` when this failure spent the last retry
        retry_scheduled: bool,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already past `Pending`: a duplicate job or an earlier worker won
    NotPending(DeliveryStatus),
    /// Another consumer in this process holds the delivery
    InFlight,
    /// Delivery no longer exists
    Missing,
    /// The status changed between load and write
    LostRace,
}

/// Removes the delivery from the in-flight set on drop
struct InFlightGuard<'a> {
    set: &'a DashSet<Uuid>,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// Drives one delivery from `Pending` to `Sent` or `Failed`.
///
/// Transport failures become a `Failed` transition and never surface as
/// errors; `WorkerError` is reserved for infrastructure failures the pool
/// retries at task level.
pub struct DeliveryWorker {
    store: Arc<dyn NotificationStore>,
    email: Arc<dyn EmailTransport>,
    push: Arc<dyn PushTransport>,
    templates: EmailTemplates,
    retry_backoff: chrono::Duration,
    in_flight: DashSet<Uuid>,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        email: Arc<dyn EmailTransport>,
        push: Arc<dyn PushTransport>,
        retry_backoff: chrono::Duration,
    ) -> Self {
        Self {
            store,
            email,
            push,
            templates: EmailTemplates::default(),
            retry_backoff,
            in_flight: DashSet::new(),
        }
    }

    pub fn with_templates(mut self, templates: EmailTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Process one delivery.
    ///
    /// No-op unless the delivery is `Pending`, so duplicate jobs and
    /// concurrent workers never produce a second transport call or
    /// transition.
    #[tracing::instrument(skip(self), fields(channel = tracing::field::Empty))]
    pub async fn process_delivery(&self, delivery_id: Uuid) -> Result<ProcessOutcome, WorkerError> {
        if !self.in_flight.insert(delivery_id) {
            tracing::debug!("Delivery already in flight, skipping");
            return Ok(ProcessOutcome::Skipped(SkipReason::InFlight));
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            id: delivery_id,
        };

        let Some(delivery) = self.store.get_delivery(delivery_id).await? else {
            tracing::warn!("Delivery not found");
            return Ok(ProcessOutcome::Skipped(SkipReason::Missing));
        };
        tracing::Span::current().record("channel", delivery.channel.as_str());

        if delivery.status != DeliveryStatus::Pending {
            tracing::debug!(status = %delivery.status, "Delivery not pending, skipping");
            DeliveryMetrics::record_skipped(delivery.channel);
            return Ok(ProcessOutcome::Skipped(SkipReason::NotPending(delivery.status)));
        }

        let started = Instant::now();
        let update = self.attempt(&delivery).await?;
        DeliveryMetrics::record_duration(delivery.channel, started.elapsed().as_secs_f64());

        let Some(updated) = self.store.complete_delivery(delivery_id, &update).await? else {
            tracing::warn!("Delivery left pending before the outcome was recorded");
            DeliveryMetrics::record_skipped(delivery.channel);
            return Ok(ProcessOutcome::Skipped(SkipReason::LostRace));
        };

        Ok(self.report(&updated))
    }

    /// Run the transport call. A delivery whose notification vanished is
    /// abandoned so the dispatch sweep stops selecting it.
    async fn attempt(&self, delivery: &NotificationDelivery) -> Result<DeliveryUpdate, WorkerError> {
        let now = Utc::now();

        if delivery.channel == Channel::InApp {
            return Ok(DeliveryUpdate::Sent {
                at: now,
                provider_message_id: None,
                provider_response: None,
            });
        }

        if delivery.recipients.is_empty() {
            return Ok(self.failed(
                now,
                format!("no recipient for {} delivery", delivery.channel),
                None,
            ));
        }

        let Some(notification) = self.store.get_notification(delivery.notification_id).await?
        else {
            tracing::warn!(
                notification_id = %delivery.notification_id,
                "Notification for delivery not found, abandoning delivery"
            );
            return Ok(DeliveryUpdate::Abandoned {
                at: now,
                error: format!("notification {} no longer exists", delivery.notification_id),
            });
        };

        let update = if delivery.channel == Channel::Email {
            self.send_email(delivery, &notification).await
        } else {
            self.send_push(delivery, &notification).await
        };
        Ok(update)
    }

    async fn send_email(
        &self,
        delivery: &NotificationDelivery,
        notification: &Notification,
    ) -> DeliveryUpdate {
        let rendered = self.templates.render(notification);
        let message = EmailMessage {
            to: delivery.recipients.clone(),
            subject: rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        };

        let result = self.email.send(&message).await;
        let now = Utc::now();
        if result.success {
            DeliveryUpdate::Sent {
                at: now,
                provider_message_id: result.provider_message_id,
                provider_response: result.response,
            }
        } else {
            let error = result
                .error
                .unwrap_or_else(|| "email provider reported failure".to_string());
            self.failed(now, error, result.response)
        }
    }

    async fn send_push(
        &self,
        delivery: &NotificationDelivery,
        notification: &Notification,
    ) -> DeliveryUpdate {
        let mut data = notification.metadata.clone();
        data.insert(
            "notification_id".into(),
            serde_json::Value::String(notification.id.to_string()),
        );
        data.insert(
            "type".into(),
            serde_json::Value::String(notification.notification_type.as_str().to_string()),
        );

        let message = PushMessage {
            device_tokens: delivery.recipients.clone(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            data,
        };

        let result = self.push.send(&message).await;
        let now = Utc::now();
        if result.success {
            tracing::debug!(
                sent = result.sent_count,
                failed = result.failed_count,
                "Push delivered"
            );
            DeliveryUpdate::Sent {
                at: now,
                provider_message_id: result.provider_message_id,
                provider_response: result.response,
            }
        } else {
            let error = result
                .error
                .unwrap_or_else(|| "push provider reported failure".to_string());
            self.failed(now, error, result.response)
        }
    }

    fn failed(
        &self,
        now: DateTime<Utc>,
        error: String,
        provider_response: Option<serde_json::Value>,
    ) -> DeliveryUpdate {
        DeliveryUpdate::Failed {
            at: now,
            error,
            retry_at: now + self.retry_backoff,
            provider_response,
        }
    }

    fn report(&self, updated: &NotificationDelivery) -> ProcessOutcome {
        match updated.status {
            DeliveryStatus::Failed => {
                let retry_scheduled = updated.next_retry_at.is_some();
                DeliveryMetrics::record_failed(updated.channel, !retry_scheduled);
                if retry_scheduled {
                    tracing::warn!(
                        error = ?updated.error_message,
                        retry_count = updated.retry_count,
                        next_retry_at = ?updated.next_retry_at,
                        "Delivery failed, retry scheduled"
                    );
                } else {
                    tracing::error!(
                        error = ?updated.error_message,
                        retry_count = updated.retry_count,
                        "Delivery failed permanently, retries exhausted"
                    );
                }
                ProcessOutcome::Failed { retry_scheduled }
            }
            _ => {
                DeliveryMetrics::record_sent(updated.channel);
                tracing::info!(
                    provider_message_id = ?updated.provider_message_id,
                    "Delivery sent"
                );
                ProcessOutcome::Sent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::notification::{NotificationType, DEFAULT_MAX_RETRIES};
    use crate::store::testing::FlakyStore;
    use crate::store::MemoryNotificationStore;
    use crate::transport::{EmailSendResult, PushSendResult};

    struct CountingEmail {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl EmailTransport for CountingEmail {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, _message: &EmailMessage) -> EmailSendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                EmailSendResult::sent(Some("msg-1".into()), None)
            } else {
                EmailSendResult::failed("Provider returned HTTP 503", None)
            }
        }
    }

    struct CountingPush {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PushTransport for CountingPush {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, message: &PushMessage) -> PushSendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(message.data["type"], "ORDER_CREATED");
            PushSendResult {
                success: true,
                sent_count: message.device_tokens.len() as u32,
                ..Default::default()
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryNotificationStore>,
        email: Arc<CountingEmail>,
        push: Arc<CountingPush>,
        worker: DeliveryWorker,
    }

    fn fixture(email_succeeds: bool) -> Fixture {
        let store = Arc::new(MemoryNotificationStore::new());
        let email = Arc::new(CountingEmail {
            calls: AtomicUsize::new(0),
            succeed: email_succeeds,
        });
        let push = Arc::new(CountingPush {
            calls: AtomicUsize::new(0),
        });
        let worker = DeliveryWorker::new(
            store.clone(),
            email.clone(),
            push.clone(),
            chrono::Duration::minutes(5),
        );
        Fixture {
            store,
            email,
            push,
            worker,
        }
    }

    async fn seed(
        store: &MemoryNotificationStore,
        channel: Channel,
        recipients: Vec<&str>,
    ) -> NotificationDelivery {
        let notification =
            Notification::new("user-1", NotificationType::OrderCreated, "Title", "Body");
        store.insert_notification(&notification).await.unwrap();
        let delivery = NotificationDelivery::new(
            notification.id,
            channel,
            recipients.into_iter().map(String::from).collect(),
            DEFAULT_MAX_RETRIES,
        );
        store.insert_delivery(&delivery).await.unwrap();
        delivery
    }

    #[tokio::test]
    async fn test_email_sent_once() {
        let f = fixture(true);
        let delivery = seed(&f.store, Channel::Email, vec!["buyer@example.com"]).await;

        let first = f.worker.process_delivery(delivery.id).await.unwrap();
        let second = f.worker.process_delivery(delivery.id).await.unwrap();

        assert_eq!(first, ProcessOutcome::Sent);
        assert_eq!(
            second,
            ProcessOutcome::Skipped(SkipReason::NotPending(DeliveryStatus::Sent))
        );
        assert_eq!(f.email.calls.load(Ordering::SeqCst), 1);

        let stored = f.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sent);
        assert_eq!(stored.provider_message_id.as_deref(), Some("msg-1"));
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_in_app_short_circuits() {
        let f = fixture(false);
        let delivery = seed(&f.store, Channel::InApp, vec!["user-1"]).await;

        let outcome = f.worker.process_delivery(delivery.id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Sent);
        assert_eq!(f.email.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.push.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_schedules_retry() {
        let f = fixture(false);
        let delivery = seed(&f.store, Channel::Email, vec!["buyer@example.com"]).await;

        let before = Utc::now();
        let outcome = f.worker.process_delivery(delivery.id).await.unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Failed {
                retry_scheduled: true
            }
        );

        let stored = f.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Failed);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.error_message.as_deref(), Some("Provider returned HTTP 503"));
        let next = stored.next_retry_at.unwrap();
        assert!(next >= before + chrono::Duration::minutes(5));
        assert!(next <= Utc::now() + chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_empty_recipients_fail_fast() {
        let f = fixture(true);
        let delivery = seed(&f.store, Channel::Email, vec![]).await;

        let outcome = f.worker.process_delivery(delivery.id).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
        assert_eq!(f.email.calls.load(Ordering::SeqCst), 0);

        let stored = f.store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(
            stored.error_message.as_deref(),
            Some("no recipient for email delivery")
        );
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_push_fans_out_in_one_call() {
        let f = fixture(true);
        let delivery = seed(&f.store, Channel::Push, vec!["tok-a", "tok-b"]).await;

        let outcome = f.worker.process_delivery(delivery.id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Sent);
        assert_eq!(f.push.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_orphaned_delivery_is_abandoned() {
        let store = Arc::new(FlakyStore::default());
        let email = Arc::new(CountingEmail {
            calls: AtomicUsize::new(0),
            succeed: true,
        });
        let worker = DeliveryWorker::new(
            store.clone(),
            email.clone(),
            Arc::new(CountingPush {
                calls: AtomicUsize::new(0),
            }),
            chrono::Duration::minutes(5),
        );
        let delivery = seed(&store.inner, Channel::Email, vec!["buyer@example.com"]).await;
        store.hide_notification(delivery.notification_id);

        let outcome = worker.process_delivery(delivery.id).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Failed { retry_scheduled: false });
        assert_eq!(email.calls.load(Ordering::SeqCst), 0);

        assert!(store.pending_deliveries(10).await.unwrap().is_empty());
        assert!(store
            .retryable_deliveries(Utc::now() + chrono::Duration::days(1), 10)
            .await
            .unwrap()
            .is_empty());
        let exhausted = store.exhausted_deliveries(10).await.unwrap();
        assert_eq!(exhausted[0].id, delivery.id);
    }

    #[tokio::test]
    async fn test_missing_delivery_is_skipped() {
        let f = fixture(true);
        let outcome = f.worker.process_delivery(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::Missing));
    }

    #[tokio::test]
    async fn test_concurrent_invocations_send_once() {
        let f = fixture(true);
        let delivery = seed(&f.store, Channel::Email, vec!["buyer@example.com"]).await;
        let worker = Arc::new(f.worker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let worker = worker.clone();
                tokio::spawn(async move { worker.process_delivery(delivery.id).await.unwrap() })
            })
            .collect();

        let mut sent = 0;
        for handle in handles {
            if handle.await.unwrap() == ProcessOutcome::Sent {
                sent += 1;
            }
        }
        assert_eq!(sent, 1);
        assert_eq!(f.email.calls.load(Ordering::SeqCst), 1);
    }
}
