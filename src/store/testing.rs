//! Test doubles for the store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use uuid::Uuid;

use crate::notification::{
    Channel, DeliveryUpdate, Notification, NotificationDelivery, PreferenceUpdate, UserPreference,
};

use super::{ListQuery, MemoryNotificationStore, NotificationStore, Page, StoreError};

/// Store whose every operation fails, standing in for an unreachable
/// database.
pub struct FailingStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::InvalidData("store unavailable".into()))
}

#[async_trait]
impl NotificationStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn insert_notification(&self, _: &Notification) -> Result<(), StoreError> {
        unavailable()
    }

    async fn delete_notification(&self, _: Uuid) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn get_notification(&self, _: Uuid) -> Result<Option<Notification>, StoreError> {
        unavailable()
    }

    async fn list_notifications(
        &self,
        _: &str,
        _: ListQuery,
    ) -> Result<Page<Notification>, StoreError> {
        unavailable()
    }

    async fn unread_count(&self, _: &str) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn mark_read(
        &self,
        _: &str,
        _: Uuid,
        _: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        unavailable()
    }

    async fn mark_all_read(&self, _: &str, _: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn delete_read_before(&self, _: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn insert_delivery(&self, _: &NotificationDelivery) -> Result<(), StoreError> {
        unavailable()
    }

    async fn get_delivery(&self, _: Uuid) -> Result<Option<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn deliveries_for(&self, _: Uuid) -> Result<Vec<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn pending_deliveries(
        &self,
        _: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn retryable_deliveries(
        &self,
        _: DateTime<Utc>,
        _: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn exhausted_deliveries(
        &self,
        _: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn complete_delivery(
        &self,
        _: Uuid,
        _: &DeliveryUpdate,
    ) -> Result<Option<NotificationDelivery>, StoreError> {
        unavailable()
    }

    async fn reset_for_retry(&self, _: Uuid, _: DateTime<Utc>) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn get_or_create_preference(&self, _: &str) -> Result<UserPreference, StoreError> {
        unavailable()
    }

    async fn update_preference(
        &self,
        _: &str,
        _: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError> {
        unavailable()
    }

    async fn add_device_token(&self, _: &str, _: &str) -> Result<UserPreference, StoreError> {
        unavailable()
    }

    async fn remove_device_token(&self, _: &str, _: &str) -> Result<UserPreference, StoreError> {
        unavailable()
    }
}

/// Memory store that fails delivery lookups for selected ids, fails
/// delivery inserts for selected channels and can hide notifications.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryNotificationStore,
    poisoned: DashSet<Uuid>,
    broken_channels: DashSet<Channel>,
    hidden: DashSet<Uuid>,
}

impl FlakyStore {
    pub fn poison(&self, delivery_id: Uuid) {
        self.poisoned.insert(delivery_id);
    }

    pub fn fail_inserts_for(&self, channel: Channel) {
        self.broken_channels.insert(channel);
    }

    /// Make the notification look deleted while its deliveries remain
    pub fn hide_notification(&self, notification_id: Uuid) {
        self.hidden.insert(notification_id);
    }
}

#[async_trait]
impl NotificationStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn insert_notification(&self, n: &Notification) -> Result<(), StoreError> {
        self.inner.insert_notification(n).await
    }

    async fn delete_notification(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_notification(id).await
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        if self.hidden.contains(&id) {
            return Ok(None);
        }
        self.inner.get_notification(id).await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        query: ListQuery,
    ) -> Result<Page<Notification>, StoreError> {
        self.inner.list_notifications(user_id, query).await
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        self.inner.unread_count(user_id).await
    }

    async fn mark_read(
        &self,
        user_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        self.inner.mark_read(user_id, id, at).await
    }

    async fn mark_all_read(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.mark_all_read(user_id, at).await
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_read_before(cutoff).await
    }

    async fn insert_delivery(&self, d: &NotificationDelivery) -> Result<(), StoreError> {
        if self.broken_channels.contains(&d.channel) {
            return unavailable();
        }
        self.inner.insert_delivery(d).await
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<NotificationDelivery>, StoreError> {
        if self.poisoned.contains(&id) {
            return unavailable();
        }
        self.inner.get_delivery(id).await
    }

    async fn deliveries_for(&self, id: Uuid) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.inner.deliveries_for(id).await
    }

    async fn pending_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.inner.pending_deliveries(limit).await
    }

    async fn retryable_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.inner.retryable_deliveries(now, limit).await
    }

    async fn exhausted_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.inner.exhausted_deliveries(limit).await
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDelivery>, StoreError> {
        self.inner.complete_delivery(id, update).await
    }

    async fn reset_for_retry(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.reset_for_retry(id, now).await
    }

    async fn get_or_create_preference(&self, user_id: &str) -> Result<UserPreference, StoreError> {
        self.inner.get_or_create_preference(user_id).await
    }

    async fn update_preference(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError> {
        self.inner.update_preference(user_id, update).await
    }

    async fn add_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        self.inner.add_device_token(user_id, token).await
    }

    async fn remove_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        self.inner.remove_device_token(user_id, token).await
    }
}
