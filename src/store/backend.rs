//! Backend trait for notification storage.
//!
//! This module defines the persistence contract for notifications, their
//! per-channel deliveries and user preferences, allowing different storage
//! implementations (memory, PostgreSQL) to be used interchangeably.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{
    Channel, DeliveryUpdate, Notification, NotificationDelivery, PreferenceUpdate, UserPreference,
};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A delivery already exists for this (notification, channel) pair
    #[error("Delivery already exists for notification {notification_id} on channel {channel}")]
    Conflict {
        notification_id: Uuid,
        channel: Channel,
    },

    /// The user already has a notification for this event key
    #[error("Event {event_key} already composed as notification {existing}")]
    DuplicateEvent { existing: Uuid, event_key: String },

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be mapped back to the data model
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pagination and filtering for notification listings.
#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub unread_only: bool,
}

impl ListQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: u32, page_size: u32, unread_only: bool) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
            unread_only,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PAGE_SIZE, false)
    }
}

/// One page of results, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Backend trait for notification storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// between the composer, worker pool, scheduler and HTTP handlers.
///
/// # Concurrency contract
///
/// `complete_delivery` and `reset_for_retry` are compare-and-swap on the
/// delivery status: of two concurrent callers for the same row, exactly one
/// observes the expected status and writes; the other gets `None`/`false`.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Backend identifier for logs and health output
    fn backend_name(&self) -> &'static str;

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Insert a notification.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEvent` if the notification carries an
    /// event key the same user already has a notification for.
    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Delete a notification and its deliveries. Returns `false` if it did
    /// not exist.
    async fn delete_notification(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Store a notification together with its deliveries: either all rows
    /// are written or none are.
    ///
    /// The default runs the single-row inserts and deletes the notification
    /// again when a delivery insert fails. Backends with transactions
    /// override it.
    async fn insert_composed(
        &self,
        notification: &Notification,
        deliveries: &[NotificationDelivery],
    ) -> Result<(), StoreError> {
        self.insert_notification(notification).await?;

        for delivery in deliveries {
            if let Err(e) = self.insert_delivery(delivery).await {
                if let Err(cleanup) = self.delete_notification(notification.id).await {
                    tracing::error!(
                        notification_id = %notification.id,
                        error = %cleanup,
                        "Failed to remove partially stored notification"
                    );
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// List a user's notifications, newest first.
    async fn list_notifications(
        &self,
        user_id: &str,
        query: ListQuery,
    ) -> Result<Page<Notification>, StoreError>;

    async fn unread_count(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Mark one of the user's notifications read (first write wins) and move
    /// its in-app delivery to `Read`. Returns `None` if the notification does
    /// not exist or belongs to another user.
    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError>;

    /// Mark every unread notification of the user read. Returns the number
    /// of notifications that changed.
    async fn mark_all_read(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete read notifications with `read_at < cutoff`, cascading to
    /// their deliveries. Returns the number of notifications deleted.
    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    // ---------------------------------------------------------------------
    // Deliveries
    // ---------------------------------------------------------------------

    /// Insert a delivery.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a delivery for the same
    /// (notification, channel) pair already exists.
    async fn insert_delivery(&self, delivery: &NotificationDelivery) -> Result<(), StoreError>;

    async fn get_delivery(&self, id: Uuid) -> Result<Option<NotificationDelivery>, StoreError>;

    async fn deliveries_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationDelivery>, StoreError>;

    /// Pending deliveries, oldest first.
    async fn pending_deliveries(&self, limit: usize)
        -> Result<Vec<NotificationDelivery>, StoreError>;

    /// Failed deliveries with `retry_count < max_retries` and
    /// `next_retry_at <= now`, earliest retry time first.
    async fn retryable_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError>;

    /// Terminally failed deliveries, most recently updated first.
    async fn exhausted_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError>;

    /// Record a worker outcome if the delivery is still `Pending`.
    ///
    /// Status, timestamps, error and retry bookkeeping change in a single
    /// write. Returns the updated record, or `None` if the delivery was not
    /// `Pending` (another worker got there first).
    async fn complete_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDelivery>, StoreError>;

    /// Move an eligible `Failed` delivery back to `Pending`. Returns `false`
    /// if the delivery is missing, not failed, exhausted or not yet due.
    async fn reset_for_retry(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    // ---------------------------------------------------------------------
    // Preferences
    // ---------------------------------------------------------------------

    /// Load the user's preferences, creating permissive defaults on first
    /// access.
    async fn get_or_create_preference(&self, user_id: &str) -> Result<UserPreference, StoreError>;

    async fn update_preference(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError>;

    async fn add_device_token(&self, user_id: &str, token: &str)
        -> Result<UserPreference, StoreError>;

    async fn remove_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_clamps() {
        let q = ListQuery::new(0, 1000, false);
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, ListQuery::MAX_PAGE_SIZE);
        assert_eq!(q.offset(), 0);

        let q = ListQuery::new(3, 20, true);
        assert_eq!(q.offset(), 40);
    }

    #[test]
    fn test_conflict_error_display() {
        let id = Uuid::nil();
        let err = StoreError::Conflict {
            notification_id: id,
            channel: Channel::Push,
        };
        assert!(err.to_string().contains("channel push"));
    }
}
