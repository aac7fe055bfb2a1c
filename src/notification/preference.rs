use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Channel, NotificationCategory};

/// Per-user channel opt-in configuration.
///
/// At most one record exists per user; it is created lazily with
/// permissive defaults on first access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub order_updates_email: bool,
    pub order_updates_push: bool,
    pub merchant_updates_email: bool,
    pub merchant_updates_push: bool,
    pub marketing_email: bool,
    pub marketing_push: bool,
    /// Registered push device tokens, in registration order
    pub device_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreference {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            email_enabled: true,
            push_enabled: true,
            order_updates_email: true,
            order_updates_push: true,
            merchant_updates_email: true,
            merchant_updates_push: true,
            marketing_email: true,
            marketing_push: true,
            device_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Category toggle for a channel. In-app is not user-configurable.
    pub fn category_enabled(&self, channel: Channel, category: NotificationCategory) -> bool {
        match (channel, category) {
            (Channel::InApp, _) => true,
            (Channel::Email, NotificationCategory::OrderUpdates) => self.order_updates_email,
            (Channel::Email, NotificationCategory::MerchantUpdates) => self.merchant_updates_email,
            (Channel::Email, NotificationCategory::Marketing) => self.marketing_email,
            (Channel::Push, NotificationCategory::OrderUpdates) => self.order_updates_push,
            (Channel::Push, NotificationCategory::MerchantUpdates) => self.merchant_updates_push,
            (Channel::Push, NotificationCategory::Marketing) => self.marketing_push,
        }
    }

    /// Register a device token. Returns `false` if it was already present.
    pub fn add_device_token(&mut self, token: &str) -> bool {
        if self.device_tokens.iter().any(|t| t == token) {
            return false;
        }
        self.device_tokens.push(token.to_string());
        self.updated_at = Utc::now();
        true
    }

    /// Remove a device token. Returns `false` if it was not registered.
    pub fn remove_device_token(&mut self, token: &str) -> bool {
        let before = self.device_tokens.len();
        self.device_tokens.retain(|t| t != token);
        let removed = self.device_tokens.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn apply(&mut self, update: &PreferenceUpdate) {
        let toggles = [
            (&mut self.email_enabled, update.email_enabled),
            (&mut self.push_enabled, update.push_enabled),
            (&mut self.order_updates_email, update.order_updates_email),
            (&mut self.order_updates_push, update.order_updates_push),
            (&mut self.merchant_updates_email, update.merchant_updates_email),
            (&mut self.merchant_updates_push, update.merchant_updates_push),
            (&mut self.marketing_email, update.marketing_email),
            (&mut self.marketing_push, update.marketing_push),
        ];
        for (field, value) in toggles {
            if let Some(value) = value {
                *field = value;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of preference toggles; `None` leaves a toggle unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub email_enabled: Option<bool>,
    #[serde(default)]
    pub push_enabled: Option<bool>,
    #[serde(default)]
    pub order_updates_email: Option<bool>,
    #[serde(default)]
    pub order_updates_push: Option<bool>,
    #[serde(default)]
    pub merchant_updates_email: Option<bool>,
    #[serde(default)]
    pub merchant_updates_push: Option<bool>,
    #[serde(default)]
    pub marketing_email: Option<bool>,
    #[serde(default)]
    pub marketing_push: Option<bool>,
}
