//! In-memory notification store using DashMap.
//!
//! This module provides a memory-based implementation of the
//! `NotificationStore` trait. Data is lost on service restart; it backs
//! development deployments and the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::{
    Channel, DeliveryStatus, DeliveryUpdate, Notification, NotificationDelivery, PreferenceUpdate,
    UserPreference,
};

use super::backend::{ListQuery, NotificationStore, Page, StoreError};

const CHANNELS: [Channel; 3] = [Channel::Email, Channel::Push, Channel::InApp];

/// In-memory notification store.
///
/// Row-level atomicity comes from DashMap shard locks: a delivery's
/// compare-and-swap runs while holding its entry's write guard.
#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: DashMap<Uuid, Notification>,
    deliveries: DashMap<Uuid, NotificationDelivery>,
    /// (notification, channel) -> delivery id
    delivery_index: DashMap<(Uuid, Channel), Uuid>,
    /// (user, event key) -> notification id
    event_index: DashMap<(String, String), Uuid>,
    preferences: DashMap<String, UserPreference>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark_in_app_read(&self, notification_id: Uuid, at: DateTime<Utc>) {
        let Some(delivery_id) = self
            .delivery_index
            .get(&(notification_id, Channel::InApp))
            .map(|r| *r.value())
        else {
            return;
        };

        if let Some(mut delivery) = self.deliveries.get_mut(&delivery_id) {
            if delivery.status != DeliveryStatus::Read {
                delivery.status = DeliveryStatus::Read;
                delivery.updated_at = at;
            }
        }
    }

    /// Drop everything hanging off a removed notification
    fn forget(&self, notification: &Notification) {
        for channel in CHANNELS {
            if let Some((_, delivery_id)) = self.delivery_index.remove(&(notification.id, channel)) {
                self.deliveries.remove(&delivery_id);
            }
        }
        if let Some(key) = &notification.event_key {
            self.event_index
                .remove_if(&(notification.user_id.clone(), key.clone()), |_, id| {
                    *id == notification.id
                });
        }
    }

    fn collect_deliveries<F>(&self, filter: F) -> Vec<NotificationDelivery>
    where
        F: Fn(&NotificationDelivery) -> bool,
    {
        self.deliveries
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        if let Some(key) = &notification.event_key {
            match self
                .event_index
                .entry((notification.user_id.clone(), key.clone()))
            {
                Entry::Occupied(slot) => {
                    return Err(StoreError::DuplicateEvent {
                        existing: *slot.get(),
                        event_key: key.clone(),
                    })
                }
                Entry::Vacant(slot) => {
                    // Index entry published only once the notification exists
                    self.notifications
                        .insert(notification.id, notification.clone());
                    slot.insert(notification.id);
                    return Ok(());
                }
            }
        }

        self.notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn delete_notification(&self, id: Uuid) -> Result<bool, StoreError> {
        match self.notifications.remove(&id) {
            Some((_, notification)) => {
                self.forget(&notification);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.notifications.get(&id).map(|r| r.value().clone()))
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        query: ListQuery,
    ) -> Result<Page<Notification>, StoreError> {
        let mut matching: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|r| r.user_id == user_id && (!query.unread_only || !r.is_read))
            .map(|r| r.value().clone())
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .notifications
            .iter()
            .filter(|r| r.user_id == user_id && !r.is_read)
            .count() as u64)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        let updated = {
            let Some(mut notification) = self.notifications.get_mut(&notification_id) else {
                return Ok(None);
            };
            if notification.user_id != user_id {
                return Ok(None);
            }
            notification.mark_read(at);
            notification.clone()
        };

        self.mark_in_app_read(notification_id, at);
        Ok(Some(updated))
    }

    async fn mark_all_read(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut changed = Vec::new();
        for mut entry in self.notifications.iter_mut() {
            if entry.user_id == user_id && entry.mark_read(at) {
                changed.push(entry.id);
            }
        }

        for id in &changed {
            self.mark_in_app_read(*id, at);
        }
        Ok(changed.len() as u64)
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let candidates: Vec<Uuid> = self
            .notifications
            .iter()
            .filter(|r| r.is_purgeable(cutoff))
            .map(|r| r.id)
            .collect();

        let mut removed = 0;
        for id in candidates {
            if let Some((_, notification)) = self
                .notifications
                .remove_if(&id, |_, n| n.is_purgeable(cutoff))
            {
                self.forget(&notification);
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn insert_delivery(&self, delivery: &NotificationDelivery) -> Result<(), StoreError> {
        if !self.notifications.contains_key(&delivery.notification_id) {
            return Err(StoreError::NotFound(format!(
                "notification {}",
                delivery.notification_id
            )));
        }

        match self
            .delivery_index
            .entry((delivery.notification_id, delivery.channel))
        {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                notification_id: delivery.notification_id,
                channel: delivery.channel,
            }),
            Entry::Vacant(slot) => {
                slot.insert(delivery.id);
                self.deliveries.insert(delivery.id, delivery.clone());
                Ok(())
            }
        }
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<NotificationDelivery>, StoreError> {
        Ok(self.deliveries.get(&id).map(|r| r.value().clone()))
    }

    async fn deliveries_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let mut deliveries = self.collect_deliveries(|d| d.notification_id == notification_id);
        deliveries.sort_by_key(|d| d.channel);
        Ok(deliveries)
    }

    async fn pending_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let mut pending = self.collect_deliveries(|d| d.status == DeliveryStatus::Pending);
        pending.sort_by_key(|d| d.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn retryable_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let mut eligible = self.collect_deliveries(|d| d.is_retry_eligible(now));
        eligible.sort_by_key(|d| d.next_retry_at);
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn exhausted_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let mut exhausted = self.collect_deliveries(NotificationDelivery::is_exhausted);
        exhausted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        exhausted.truncate(limit);
        Ok(exhausted)
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDelivery>, StoreError> {
        let Some(mut delivery) = self.deliveries.get_mut(&id) else {
            return Err(StoreError::NotFound(format!("delivery {}", id)));
        };

        if delivery.apply(update) {
            Ok(Some(delivery.clone()))
        } else {
            Ok(None)
        }
    }

    async fn reset_for_retry(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .deliveries
            .get_mut(&id)
            .map(|mut d| d.reset_for_retry(now))
            .unwrap_or(false))
    }

    async fn get_or_create_preference(&self, user_id: &str) -> Result<UserPreference, StoreError> {
        Ok(self
            .preferences
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreference::new(user_id))
            .clone())
    }

    async fn update_preference(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError> {
        let mut pref = self
            .preferences
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreference::new(user_id));
        pref.apply(update);
        Ok(pref.clone())
    }

    async fn add_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        let mut pref = self
            .preferences
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreference::new(user_id));
        pref.add_device_token(token);
        Ok(pref.clone())
    }

    async fn remove_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        let mut pref = self
            .preferences
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreference::new(user_id));
        pref.remove_device_token(token);
        Ok(pref.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;
    use chrono::Duration;

    async fn seed(store: &MemoryNotificationStore, user_id: &str) -> Notification {
        let n = Notification::new(user_id, NotificationType::OrderCreated, "title", "body");
        store.insert_notification(&n).await.unwrap();
        n
    }

    fn failure(now: DateTime<Utc>) -> DeliveryUpdate {
        DeliveryUpdate::Failed {
            at: now,
            error: "boom".to_string(),
            retry_at: now + Duration::minutes(5),
            provider_response: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_conflict() {
        let store = MemoryNotificationStore::new();
        let n = seed(&store, "user-1").await;

        let first = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 3);
        store.insert_delivery(&first).await.unwrap();

        let second = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 3);
        let err = store.insert_delivery(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { channel: Channel::Email, .. }));

        assert_eq!(store.deliveries_for(n.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_requires_notification() {
        let store = MemoryNotificationStore::new();
        let orphan = NotificationDelivery::new(Uuid::new_v4(), Channel::InApp, vec![], 3);
        let err = store.insert_delivery(&orphan).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_delivery_is_compare_and_swap() {
        let store = MemoryNotificationStore::new();
        let n = seed(&store, "user-1").await;
        let d = NotificationDelivery::new(n.id, Channel::InApp, vec![], 3);
        store.insert_delivery(&d).await.unwrap();

        let sent = DeliveryUpdate::Sent {
            at: Utc::now(),
            provider_message_id: None,
            provider_response: None,
        };
        assert!(store.complete_delivery(d.id, &sent).await.unwrap().is_some());
        assert!(store.complete_delivery(d.id, &sent).await.unwrap().is_none());
        assert!(store
            .complete_delivery(d.id, &failure(Utc::now()))
            .await
            .unwrap()
            .is_none());

        let stored = store.get_delivery(d.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_pending_and_retryable_queries() {
        let store = MemoryNotificationStore::new();
        let n = seed(&store, "user-1").await;
        let email = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 3);
        let push = NotificationDelivery::new(n.id, Channel::Push, vec!["tok".into()], 3);
        store.insert_delivery(&email).await.unwrap();
        store.insert_delivery(&push).await.unwrap();

        assert_eq!(store.pending_deliveries(100).await.unwrap().len(), 2);
        assert_eq!(store.pending_deliveries(1).await.unwrap().len(), 1);

        let now = Utc::now();
        store.complete_delivery(email.id, &failure(now)).await.unwrap();

        assert!(store.retryable_deliveries(now, 50).await.unwrap().is_empty());
        let later = now + Duration::minutes(5);
        let eligible = store.retryable_deliveries(later, 50).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, email.id);

        assert!(store.reset_for_retry(email.id, later).await.unwrap());
        assert!(!store.reset_for_retry(email.id, later).await.unwrap());
        assert_eq!(store.pending_deliveries(100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_deliveries_are_queryable() {
        let store = MemoryNotificationStore::new();
        let n = seed(&store, "user-1").await;
        let d = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 1);
        store.insert_delivery(&d).await.unwrap();

        store.complete_delivery(d.id, &failure(Utc::now())).await.unwrap();

        let exhausted = store.exhausted_deliveries(10).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert!(store
            .retryable_deliveries(Utc::now() + Duration::days(1), 50)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_owner_and_moves_in_app_to_read() {
        let store = MemoryNotificationStore::new();
        let n = seed(&store, "user-1").await;
        let in_app = NotificationDelivery::new(n.id, Channel::InApp, vec![], 3);
        store.insert_delivery(&in_app).await.unwrap();

        assert!(store
            .mark_read("user-2", n.id, Utc::now())
            .await
            .unwrap()
            .is_none());

        let read = store
            .mark_read("user-1", n.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(read.is_read);

        let delivery = store.get_delivery(in_app.id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn test_list_pagination_and_unread() {
        let store = MemoryNotificationStore::new();
        for _ in 0..5 {
            seed(&store, "user-1").await;
        }
        seed(&store, "user-2").await;

        let page = store
            .list_notifications("user-1", ListQuery::new(2, 2, false))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        assert_eq!(store.mark_all_read("user-1", Utc::now()).await.unwrap(), 5);
        assert_eq!(store.mark_all_read("user-1", Utc::now()).await.unwrap(), 0);
        assert_eq!(store.unread_count("user-1").await.unwrap(), 0);
        assert_eq!(store.unread_count("user-2").await.unwrap(), 1);

        let unread = store
            .list_notifications("user-1", ListQuery::new(1, 20, true))
            .await
            .unwrap();
        assert_eq!(unread.total, 0);
    }

    #[tokio::test]
    async fn test_delete_read_before_cascades() {
        let store = MemoryNotificationStore::new();
        let old = seed(&store, "user-1").await;
        let d = NotificationDelivery::new(old.id, Channel::InApp, vec![], 3);
        store.insert_delivery(&d).await.unwrap();
        store
            .mark_read("user-1", old.id, Utc::now() - Duration::days(31))
            .await
            .unwrap();

        let kept = seed(&store, "user-1").await;

        let removed = store
            .delete_read_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_notification(old.id).await.unwrap().is_none());
        assert!(store.get_delivery(d.id).await.unwrap().is_none());
        assert!(store.get_notification(kept.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_composed_is_all_or_nothing() {
        let store = MemoryNotificationStore::new();
        let n = Notification::new("user-1", NotificationType::OrderCreated, "title", "body");
        let email = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 3);
        let again = NotificationDelivery::new(n.id, Channel::Email, vec!["a@b.c".into()], 3);

        let err = store
            .insert_composed(&n, &[email.clone(), again])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.get_notification(n.id).await.unwrap().is_none());
        assert!(store.get_delivery(email.id).await.unwrap().is_none());
        assert_eq!(store.unread_count("user-1").await.unwrap(), 0);

        let in_app = NotificationDelivery::new(n.id, Channel::InApp, vec![], 3);
        store.insert_composed(&n, &[email, in_app]).await.unwrap();
        assert_eq!(store.deliveries_for(n.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_key_is_unique_per_user() {
        let store = MemoryNotificationStore::new();
        let key = Some("evt-1:ORDER_CREATED".to_string());
        let first = Notification::new("user-1", NotificationType::OrderCreated, "t", "b")
            .with_event_key(key.clone());
        store.insert_notification(&first).await.unwrap();

        let retry = Notification::new("user-1", NotificationType::OrderCreated, "t", "b")
            .with_event_key(key.clone());
        match store.insert_notification(&retry).await {
            Err(StoreError::DuplicateEvent { existing, .. }) => assert_eq!(existing, first.id),
            other => panic!("expected duplicate event, got {:?}", other),
        }

        let other_user = Notification::new("user-2", NotificationType::OrderCreated, "t", "b")
            .with_event_key(key.clone());
        store.insert_notification(&other_user).await.unwrap();

        assert!(store.delete_notification(first.id).await.unwrap());
        assert!(!store.delete_notification(first.id).await.unwrap());
        store.insert_notification(&retry).await.unwrap();
    }

    #[tokio::test]
    async fn test_preferences_created_lazily_once() {
        let store = MemoryNotificationStore::new();
        let first = store.get_or_create_preference("user-1").await.unwrap();
        store.add_device_token("user-1", "tok-1").await.unwrap();
        let second = store.get_or_create_preference("user-1").await.unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.device_tokens, vec!["tok-1"]);

        let updated = store
            .update_preference(
                "user-1",
                &PreferenceUpdate {
                    push_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.push_enabled);
        assert_eq!(updated.device_tokens, vec!["tok-1"]);
    }
}
