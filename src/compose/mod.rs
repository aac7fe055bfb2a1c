//! Composition service.
//!
//! Turns one event for one user into a `Notification` plus one `Pending`
//! delivery per channel selected by the preference resolver. Persistence
//! only: transport happens in the delivery worker.

pub mod messages;

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::metrics::ComposeMetrics;
use crate::notification::{
    Channel, Metadata, Notification, NotificationDelivery, NotificationType, Recipient,
    RelatedIds,
};
use crate::preference::PreferenceResolver;
use crate::store::{NotificationStore, StoreError};
use crate::worker::{DeliveryJob, WorkQueue};

pub use messages::Message;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What happens to the new deliveries after they are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Hand each delivery to the work queue right away
    #[default]
    Immediate,
    /// Leave them `Pending` for the next dispatch sweep
    Deferred,
}

#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub recipient: Recipient,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub metadata: Metadata,
    pub related: RelatedIds,
    pub dispatch: DispatchMode,
    /// Deduplication key, see [`ComposeRequest::with_event_id`]
    pub event_key: Option<String>,
}

impl ComposeRequest {
    pub fn new(
        recipient: Recipient,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            notification_type,
            title: title.into(),
            body: body.into(),
            metadata: Metadata::new(),
            related: RelatedIds::default(),
            dispatch: DispatchMode::default(),
            event_key: None,
        }
    }

    pub fn from_message(recipient: Recipient, notification_type: NotificationType, message: Message) -> Self {
        Self::new(recipient, notification_type, message.title, message.body)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_related(mut self, related: RelatedIds) -> Self {
        self.related = related;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Tie the request to an emitter event id. Composing the same event
    /// twice for the same user and type returns the first notification.
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_key = Some(format!("{}:{}", event_id, self.notification_type));
        self
    }
}

/// A stored notification and the deliveries created for it
#[derive(Debug, Clone)]
pub struct ComposedNotification {
    pub notification: Notification,
    pub deliveries: Vec<NotificationDelivery>,
}

impl ComposedNotification {
    pub fn channels(&self) -> Vec<Channel> {
        self.deliveries.iter().map(|d| d.channel).collect()
    }
}

pub struct NotificationComposer {
    store: Arc<dyn NotificationStore>,
    resolver: PreferenceResolver,
    queue: Option<Arc<dyn WorkQueue>>,
    max_retries: u32,
}

impl NotificationComposer {
    pub fn new(store: Arc<dyn NotificationStore>, max_retries: u32) -> Self {
        Self {
            resolver: PreferenceResolver::new(store.clone()),
            store,
            queue: None,
            max_retries,
        }
    }

    /// Enable immediate dispatch through a work queue
    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Store a notification and its per-channel deliveries.
    ///
    /// The notification and all of its deliveries are written together; on
    /// error nothing is left behind. A request whose event key was already
    /// composed for the user returns the stored notification without
    /// dispatching again. A failed enqueue is logged and leaves the delivery
    /// `Pending` for the dispatch sweep.
    #[tracing::instrument(
        skip(self, request),
        fields(
            user_id = %request.recipient.user_id,
            notification_type = %request.notification_type,
        )
    )]
    pub async fn compose(&self, request: ComposeRequest) -> Result<ComposedNotification, ComposeError> {
        let user_id = request.recipient.user_id.clone();
        let resolved = self
            .resolver
            .resolve(&user_id, request.notification_type.category())
            .await?;

        let notification = Notification::new(
            user_id.clone(),
            request.notification_type,
            request.title,
            request.body,
        )
        .with_related(request.related)
        .with_metadata(request.metadata)
        .with_event_key(request.event_key);

        let deliveries: Vec<NotificationDelivery> = resolved
            .channels
            .iter()
            .map(|channel| {
                let recipients = match channel {
                    Channel::Email => request.recipient.email.iter().cloned().collect(),
                    Channel::Push => resolved.device_tokens.clone(),
                    Channel::InApp => vec![user_id.clone()],
                };
                NotificationDelivery::new(notification.id, *channel, recipients, self.max_retries)
            })
            .collect();

        match self.store.insert_composed(&notification, &deliveries).await {
            Ok(()) => {}
            Err(StoreError::DuplicateEvent { existing, event_key }) => {
                tracing::debug!(
                    notification_id = %existing,
                    event_key = %event_key,
                    "Event already composed, returning stored notification"
                );
                return self.load_composed(existing).await;
            }
            Err(e) => return Err(e.into()),
        }

        for delivery in &deliveries {
            ComposeMetrics::record_delivery_created(delivery.channel);
        }
        ComposeMetrics::record_composed(notification.notification_type);
        tracing::info!(
            notification_id = %notification.id,
            channels = ?resolved.channels,
            "Notification composed"
        );

        if request.dispatch == DispatchMode::Immediate {
            self.dispatch(&deliveries).await;
        }

        Ok(ComposedNotification {
            notification,
            deliveries,
        })
    }

    async fn load_composed(&self, id: Uuid) -> Result<ComposedNotification, ComposeError> {
        let notification = self
            .store
            .get_notification(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;
        let deliveries = self.store.deliveries_for(id).await?;

        Ok(ComposedNotification {
            notification,
            deliveries,
        })
    }

    /// Compose without failing the caller. Errors are logged and counted.
    pub async fn compose_best_effort(&self, request: ComposeRequest) -> Option<ComposedNotification> {
        let user_id = request.recipient.user_id.clone();
        let notification_type = request.notification_type;

        match self.compose(request).await {
            Ok(composed) => Some(composed),
            Err(e) => {
                ComposeMetrics::record_failure();
                tracing::error!(
                    user_id = %user_id,
                    notification_type = %notification_type,
                    error = %e,
                    "Failed to compose notification, event dropped"
                );
                None
            }
        }
    }

    async fn dispatch(&self, deliveries: &[NotificationDelivery]) {
        let Some(queue) = &self.queue else {
            return;
        };

        for delivery in deliveries {
            if let Err(e) = queue.enqueue(DeliveryJob::new(delivery.id)).await {
                tracing::warn!(
                    delivery_id = %delivery.id,
                    error = %e,
                    "Failed to enqueue delivery, leaving it for the dispatch sweep"
                );
            }
        }
    }
}
