use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form structured metadata attached to a notification
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Closed set of notification types emitted by the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderCreated,
    OrderContacted,
    OrderConfirmed,
    OrderCompleted,
    OrderCancelled,
    MerchantNewOrder,
    MerchantApproved,
    MerchantDeactivated,
    MerchantSuspended,
    ListingApproved,
    ListingRejected,
}

impl NotificationType {
    pub const ALL: [NotificationType; 11] = [
        Self::OrderCreated,
        Self::OrderContacted,
        Self::OrderConfirmed,
        Self::OrderCompleted,
        Self::OrderCancelled,
        Self::MerchantNewOrder,
        Self::MerchantApproved,
        Self::MerchantDeactivated,
        Self::MerchantSuspended,
        Self::ListingApproved,
        Self::ListingRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "ORDER_CREATED",
            Self::OrderContacted => "ORDER_CONTACTED",
            Self::OrderConfirmed => "ORDER_CONFIRMED",
            Self::OrderCompleted => "ORDER_COMPLETED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::MerchantNewOrder => "MERCHANT_NEW_ORDER",
            Self::MerchantApproved => "MERCHANT_APPROVED",
            Self::MerchantDeactivated => "MERCHANT_DEACTIVATED",
            Self::MerchantSuspended => "MERCHANT_SUSPENDED",
            Self::ListingApproved => "LISTING_APPROVED",
            Self::ListingRejected => "LISTING_REJECTED",
        }
    }

    /// Preference category that gates this type's email/push channels.
    ///
    /// A new-order alert goes to the merchant, so it is a merchant update
    /// even though it is triggered by an order.
    pub fn category(&self) -> NotificationCategory {
        match self {
            Self::OrderCreated
            | Self::OrderContacted
            | Self::OrderConfirmed
            | Self::OrderCompleted
            | Self::OrderCancelled => NotificationCategory::OrderUpdates,
            Self::MerchantNewOrder
            | Self::MerchantApproved
            | Self::MerchantDeactivated
            | Self::MerchantSuspended
            | Self::ListingApproved
            | Self::ListingRejected => NotificationCategory::MerchantUpdates,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {}", s))
    }
}

/// Preference categories a user can opt in or out of per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    OrderUpdates,
    MerchantUpdates,
    Marketing,
}

/// Loose references to the marketplace entities a notification is about.
/// No referential integrity is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
}

impl RelatedIds {
    pub fn order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Default::default()
        }
    }

    pub fn merchant(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: Some(merchant_id.into()),
            ..Default::default()
        }
    }

    pub fn listing(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: Some(listing_id.into()),
            ..Default::default()
        }
    }

    pub fn with_merchant(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }
}

/// The user a notification is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Recipient {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
        }
    }
}

/// One logical event delivered to one user.
///
/// Immutable after creation except for the read receipt
/// (`is_read` / `read_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub related: RelatedIds,
    #[serde(default)]
    pub metadata: Metadata,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Emitter-supplied key; at most one notification per (user, key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_key: Option<String>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            notification_type,
            title: title.into(),
            body: body.into(),
            related: RelatedIds::default(),
            metadata: Metadata::new(),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
            event_key: None,
        }
    }

    pub fn with_event_key(mut self, event_key: Option<String>) -> Self {
        self.event_key = event_key;
        self
    }

    pub fn with_related(mut self, related: RelatedIds) -> Self {
        self.related = related;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Apply a read receipt. The first read wins; later calls keep the
    /// original `read_at`. Returns `true` if the notification changed.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }

    /// Whether the cleanup sweep may purge this notification
    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_read && self.read_at.is_some_and(|read_at| read_at < cutoff)
    }
}
