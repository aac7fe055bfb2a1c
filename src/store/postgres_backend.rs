//! PostgreSQL-based notification store.
//!
//! This module provides a persistent implementation of the `NotificationStore`
//! trait. Row-level compare-and-swap on `notification_deliveries.status` keeps
//! concurrent workers from both transitioning the same delivery; the
//! `(notification_id, channel)` unique constraint rejects duplicate deliveries.
//!
//! Tables (see `migrations/`):
//! - `notifications`
//! - `notification_deliveries` (cascades from `notifications`)
//! - `user_preferences`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::notification::{
    Channel, DeliveryUpdate, Metadata, Notification, NotificationDelivery, PreferenceUpdate,
    RelatedIds, UserPreference,
};

use super::backend::{ListQuery, NotificationStore, Page, StoreError};

const NOTIFICATION_COLUMNS: &str = "id, user_id, notification_type, title, body, order_id, \
     merchant_id, listing_id, metadata, is_read, read_at, created_at, event_key";

const DELIVERY_COLUMNS: &str = "id, notification_id, channel, status, recipients, sent_at, \
     delivered_at, error_message, retry_count, max_retries, next_retry_at, provider_message_id, \
     provider_response, created_at, updated_at";

const PREFERENCE_COLUMNS: &str = "user_id, email_enabled, push_enabled, order_updates_email, \
     order_updates_push, merchant_updates_email, merchant_updates_push, marketing_email, \
     marketing_push, device_tokens, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    notification_type: String,
    title: String,
    body: String,
    order_id: Option<String>,
    merchant_id: Option<String>,
    listing_id: Option<String>,
    metadata: serde_json::Value,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    event_key: Option<String>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Metadata::new(),
            other => {
                return Err(StoreError::InvalidData(format!(
                    "notification {} metadata is not an object: {}",
                    row.id, other
                )))
            }
        };

        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            notification_type: row
                .notification_type
                .parse()
                .map_err(StoreError::InvalidData)?,
            title: row.title,
            body: row.body,
            related: RelatedIds {
                order_id: row.order_id,
                merchant_id: row.merchant_id,
                listing_id: row.listing_id,
            },
            metadata,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
            event_key: row.event_key,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    notification_id: Uuid,
    channel: String,
    status: String,
    recipients: Vec<String>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    provider_message_id: Option<String>,
    provider_response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for NotificationDelivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(NotificationDelivery {
            id: row.id,
            notification_id: row.notification_id,
            channel: row.channel.parse().map_err(StoreError::InvalidData)?,
            status: row.status.parse().map_err(StoreError::InvalidData)?,
            recipients: row.recipients,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            error_message: row.error_message,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            next_retry_at: row.next_retry_at,
            provider_message_id: row.provider_message_id,
            provider_response: row.provider_response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PreferenceRow {
    user_id: String,
    email_enabled: bool,
    push_enabled: bool,
    order_updates_email: bool,
    order_updates_push: bool,
    merchant_updates_email: bool,
    merchant_updates_push: bool,
    marketing_email: bool,
    marketing_push: bool,
    device_tokens: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PreferenceRow> for UserPreference {
    fn from(row: PreferenceRow) -> Self {
        UserPreference {
            user_id: row.user_id,
            email_enabled: row.email_enabled,
            push_enabled: row.push_enabled,
            order_updates_email: row.order_updates_email,
            order_updates_push: row.order_updates_push,
            merchant_updates_email: row.merchant_updates_email,
            merchant_updates_push: row.merchant_updates_push,
            marketing_email: row.marketing_email,
            marketing_push: row.marketing_push,
            device_tokens: row.device_tokens,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn to_deliveries(rows: Vec<DeliveryRow>) -> Result<Vec<NotificationDelivery>, StoreError> {
    rows.into_iter().map(NotificationDelivery::try_from).collect()
}

async fn insert_notification_row(
    conn: &mut PgConnection,
    notification: &Notification,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications
            (id, user_id, notification_type, title, body, order_id, merchant_id,
             listing_id, metadata, is_read, read_at, created_at, event_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (user_id, event_key) WHERE event_key IS NOT NULL DO NOTHING
        "#,
    )
    .bind(notification.id)
    .bind(&notification.user_id)
    .bind(notification.notification_type.as_str())
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.related.order_id)
    .bind(&notification.related.merchant_id)
    .bind(&notification.related.listing_id)
    .bind(serde_json::Value::Object(notification.metadata.clone()))
    .bind(notification.is_read)
    .bind(notification.read_at)
    .bind(notification.created_at)
    .bind(&notification.event_key)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    // Only the (user_id, event_key) index can swallow the insert
    let event_key = notification.event_key.clone().unwrap_or_default();
    let existing: Uuid =
        sqlx::query_scalar("SELECT id FROM notifications WHERE user_id = $1 AND event_key = $2")
            .bind(&notification.user_id)
            .bind(&event_key)
            .fetch_one(&mut *conn)
            .await?;

    Err(StoreError::DuplicateEvent {
        existing,
        event_key,
    })
}

async fn insert_delivery_row(
    conn: &mut PgConnection,
    delivery: &NotificationDelivery,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO notification_deliveries
            (id, notification_id, channel, status, recipients, retry_count, max_retries,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (notification_id, channel) DO NOTHING
        "#,
    )
    .bind(delivery.id)
    .bind(delivery.notification_id)
    .bind(delivery.channel.as_str())
    .bind(delivery.status.as_str())
    .bind(&delivery.recipients)
    .bind(delivery.retry_count as i32)
    .bind(delivery.max_retries as i32)
    .bind(delivery.created_at)
    .bind(delivery.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict {
            notification_id: delivery.notification_id,
            channel: delivery.channel,
        });
    }
    Ok(())
}

/// PostgreSQL-based notification store.
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_preference(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_preferences (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_preference(&self, user_id: &str) -> Result<UserPreference, StoreError> {
        let row = sqlx::query_as::<_, PreferenceRow>(&format!(
            "SELECT {} FROM user_preferences WHERE user_id = $1",
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("preferences for user {}", user_id)))?;

        Ok(row.into())
    }

    async fn delivery_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notification_deliveries WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn fetch_deliveries(
        &self,
        filter: &str,
        bind_now: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let sql = format!(
            "SELECT {} FROM notification_deliveries {}",
            DELIVERY_COLUMNS, filter
        );
        let mut query = sqlx::query_as::<_, DeliveryRow>(&sql);
        if let Some(now) = bind_now {
            query = query.bind(now);
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;
        to_deliveries(rows)
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_notification_row(&mut *conn, notification).await
    }

    async fn delete_notification(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_composed(
        &self,
        notification: &Notification,
        deliveries: &[NotificationDelivery],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        insert_notification_row(&mut *tx, notification).await?;
        for delivery in deliveries {
            insert_delivery_row(&mut *tx, delivery).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Notification::try_from)
        .transpose()
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        query: ListQuery,
    ) -> Result<Page<Notification>, StoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(query.unread_only)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {} FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(query.unread_only)
        .bind(query.page_size as i64)
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // COALESCE keeps the first read_at: repeated receipts are no-ops
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(notification_id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE notification_deliveries
            SET status = 'read', updated_at = $2
            WHERE notification_id = $1 AND channel = 'in_app' AND status <> 'read'
            "#,
        )
        .bind(notification_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Notification::try_from(row).map(Some)
    }

    async fn mark_all_read(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = $2
            WHERE user_id = $1 AND is_read = FALSE
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_all(&mut *tx)
        .await?;

        if !ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE notification_deliveries
                SET status = 'read', updated_at = $2
                WHERE notification_id = ANY($1) AND channel = 'in_app' AND status <> 'read'
                "#,
            )
            .bind(&ids)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    async fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = TRUE AND read_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn insert_delivery(&self, delivery: &NotificationDelivery) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_delivery_row(&mut *conn, delivery).await
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<NotificationDelivery>, StoreError> {
        sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM notification_deliveries WHERE id = $1",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(NotificationDelivery::try_from)
        .transpose()
    }

    async fn deliveries_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM notification_deliveries WHERE notification_id = $1 ORDER BY channel",
            DELIVERY_COLUMNS
        ))
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        to_deliveries(rows)
    }

    async fn pending_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.fetch_deliveries(
            "WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
            None,
            limit,
        )
        .await
    }

    async fn retryable_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.fetch_deliveries(
            r#"
            WHERE status = 'failed' AND retry_count < max_retries AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
            Some(now),
            limit,
        )
        .await
    }

    async fn exhausted_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationDelivery>, StoreError> {
        self.fetch_deliveries(
            r#"
            WHERE status = 'failed' AND retry_count >= max_retries
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
            None,
            limit,
        )
        .await
    }

    async fn complete_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<NotificationDelivery>, StoreError> {
        // The status guard in WHERE makes this a compare-and-swap: a
        // concurrent second writer re-evaluates it after the first commits
        // and matches nothing.
        let row = match update {
            DeliveryUpdate::Sent {
                at,
                provider_message_id,
                provider_response,
            } => {
                sqlx::query_as::<_, DeliveryRow>(&format!(
                    r#"
                    UPDATE notification_deliveries
                    SET status = 'sent', sent_at = $2, error_message = NULL,
                        next_retry_at = NULL, provider_message_id = $3,
                        provider_response = $4, updated_at = $2
                    WHERE id = $1 AND status = 'pending'
                    RETURNING {}
                    "#,
                    DELIVERY_COLUMNS
                ))
                .bind(id)
                .bind(at)
                .bind(provider_message_id)
                .bind(provider_response)
                .fetch_optional(&self.pool)
                .await?
            }
            DeliveryUpdate::Failed {
                at,
                error,
                retry_at,
                provider_response,
            } => {
                sqlx::query_as::<_, DeliveryRow>(&format!(
                    r#"
                    UPDATE notification_deliveries
                    SET status = 'failed', error_message = $3,
                        retry_count = LEAST(retry_count + 1, max_retries),
                        next_retry_at = CASE
                            WHEN LEAST(retry_count + 1, max_retries) < max_retries THEN $4
                            ELSE NULL
                        END,
                        provider_response = $5, updated_at = $2
                    WHERE id = $1 AND status = 'pending'
                    RETURNING {}
                    "#,
                    DELIVERY_COLUMNS
                ))
                .bind(id)
                .bind(at)
                .bind(error)
                .bind(retry_at)
                .bind(provider_response)
                .fetch_optional(&self.pool)
                .await?
            }
            DeliveryUpdate::Abandoned { at, error } => {
                sqlx::query_as::<_, DeliveryRow>(&format!(
                    r#"
                    UPDATE notification_deliveries
                    SET status = 'failed', error_message = $3, retry_count = max_retries,
                        next_retry_at = NULL, updated_at = $2
                    WHERE id = $1 AND status = 'pending'
                    RETURNING {}
                    "#,
                    DELIVERY_COLUMNS
                ))
                .bind(id)
                .bind(at)
                .bind(error)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => NotificationDelivery::try_from(row).map(Some),
            None if self.delivery_exists(id).await? => Ok(None),
            None => Err(StoreError::NotFound(format!("delivery {}", id))),
        }
    }

    async fn reset_for_retry(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_deliveries
            SET status = 'pending', next_retry_at = NULL, updated_at = $2
            WHERE id = $1
              AND status = 'failed'
              AND retry_count < max_retries
              AND next_retry_at <= $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_or_create_preference(&self, user_id: &str) -> Result<UserPreference, StoreError> {
        self.ensure_preference(user_id).await?;
        self.fetch_preference(user_id).await
    }

    async fn update_preference(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<UserPreference, StoreError> {
        self.ensure_preference(user_id).await?;

        let row = sqlx::query_as::<_, PreferenceRow>(&format!(
            r#"
            UPDATE user_preferences SET
                email_enabled = COALESCE($2, email_enabled),
                push_enabled = COALESCE($3, push_enabled),
                order_updates_email = COALESCE($4, order_updates_email),
                order_updates_push = COALESCE($5, order_updates_push),
                merchant_updates_email = COALESCE($6, merchant_updates_email),
                merchant_updates_push = COALESCE($7, merchant_updates_push),
                marketing_email = COALESCE($8, marketing_email),
                marketing_push = COALESCE($9, marketing_push),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .bind(update.email_enabled)
        .bind(update.push_enabled)
        .bind(update.order_updates_email)
        .bind(update.order_updates_push)
        .bind(update.merchant_updates_email)
        .bind(update.merchant_updates_push)
        .bind(update.marketing_email)
        .bind(update.marketing_push)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn add_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        self.ensure_preference(user_id).await?;

        sqlx::query(
            r#"
            UPDATE user_preferences
            SET device_tokens = array_append(device_tokens, $2), updated_at = NOW()
            WHERE user_id = $1 AND NOT ($2 = ANY(device_tokens))
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        self.fetch_preference(user_id).await
    }

    async fn remove_device_token(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<UserPreference, StoreError> {
        self.ensure_preference(user_id).await?;

        sqlx::query(
            r#"
            UPDATE user_preferences
            SET device_tokens = array_remove(device_tokens, $2), updated_at = NOW()
            WHERE user_id = $1 AND $2 = ANY(device_tokens)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        self.fetch_preference(user_id).await
    }
}
