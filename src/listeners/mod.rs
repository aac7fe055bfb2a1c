//! Domain event listeners.
//!
//! Order, merchant and listing modules pass an explicit
//! `StateChange { previous, current }` captured around their write. Each
//! submodule maps a change to zero or more `ComposeRequest`s with a pure
//! `plan_*` function; `EventListeners` runs the plan against the composer.
//! A change without a `previous` snapshot is a comparison miss and
//! produces nothing.

pub mod listing;
pub mod merchant;
pub mod order;

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::compose::{ComposeRequest, NotificationComposer};
use crate::notification::Metadata;

pub use listing::{ListingSnapshot, ListingStatus};
pub use merchant::{MerchantSnapshot, MerchantStatus};
pub use order::{OrderSnapshot, OrderStatus};

/// Entity state before and after one write
#[derive(Debug, Clone, Deserialize)]
pub struct StateChange<T> {
    pub previous: Option<T>,
    pub current: T,
}

impl<T> StateChange<T> {
    pub fn new(previous: Option<T>, current: T) -> Self {
        Self { previous, current }
    }

    /// Both snapshots, or `None` on a comparison miss
    pub fn pair(&self) -> Option<(&T, &T)> {
        self.previous.as_ref().map(|prev| (prev, &self.current))
    }
}

/// Build metadata from string pairs, skipping absent values
pub(crate) fn metadata(pairs: &[(&str, Option<&str>)]) -> Metadata {
    pairs
        .iter()
        .filter_map(|(key, value)| {
            value.map(|v| (key.to_string(), serde_json::Value::String(v.to_string())))
        })
        .collect()
}

/// Runs listener plans against the composer.
///
/// Composition is best-effort: a failure is logged and dropped and never
/// reaches the domain operation that raised the event.
#[derive(Clone)]
pub struct EventListeners {
    composer: Arc<NotificationComposer>,
}

/// `event_id` is the emitter's id for the write. Replaying an event with the
/// same id returns the notifications composed the first time.
impl EventListeners {
    pub fn new(composer: Arc<NotificationComposer>) -> Self {
        Self { composer }
    }

    pub async fn order_created(&self, order: &OrderSnapshot, event_id: Option<&str>) -> Vec<Uuid> {
        self.compose_all(order::plan_created(order), event_id).await
    }

    pub async fn order_status_changed(
        &self,
        change: &StateChange<OrderSnapshot>,
        event_id: Option<&str>,
    ) -> Vec<Uuid> {
        self.compose_all(order::plan_status_change(change).into_iter().collect(), event_id)
            .await
    }

    pub async fn merchant_changed(
        &self,
        change: &StateChange<MerchantSnapshot>,
        event_id: Option<&str>,
    ) -> Vec<Uuid> {
        self.compose_all(merchant::plan_change(change).into_iter().collect(), event_id)
            .await
    }

    pub async fn listing_changed(
        &self,
        change: &StateChange<ListingSnapshot>,
        event_id: Option<&str>,
    ) -> Vec<Uuid> {
        self.compose_all(listing::plan_change(change).into_iter().collect(), event_id)
            .await
    }

    /// Ids of the notifications actually stored
    async fn compose_all(&self, requests: Vec<ComposeRequest>, event_id: Option<&str>) -> Vec<Uuid> {
        if requests.is_empty() {
            tracing::debug!("Event matched no notification mapping");
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let request = match event_id {
                Some(event_id) => request.with_event_id(event_id),
                None => request,
            };
            if let Some(composed) = self.composer.compose_best_effort(request).await {
                ids.push(composed.notification.id);
            }
        }
        ids
    }
}
