//! Per-channel delivery attempt tracking

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of business-level delivery attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delivery mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
    InApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::InApp => "in_app",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            "in_app" => Ok(Self::InApp),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// Delivery state machine.
///
/// ```text
/// Pending -> Sent | Failed        (delivery worker)
/// Failed  -> Pending              (retry sweep, while retries remain)
/// Sent    -> Delivered            (provider confirmation, reserved)
/// *       -> Read                 (in-app only, on read receipt)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// One attempt-tracking record per (notification, channel) pair.
///
/// Push deliveries fan out to every registered device token, but the whole
/// token list is one logical attempt tracked by a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub channel: Channel,
    pub status: DeliveryStatus,
    /// Email address or push device tokens, in registration order
    pub recipients: Vec<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationDelivery {
    pub fn new(
        notification_id: Uuid,
        channel: Channel,
        recipients: Vec<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            notification_id,
            channel,
            status: DeliveryStatus::Pending,
            recipients,
            sent_at: None,
            delivered_at: None,
            error_message: None,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            provider_message_id: None,
            provider_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Failed with every retry spent. Terminal: never scheduled again.
    pub fn is_exhausted(&self) -> bool {
        self.status == DeliveryStatus::Failed && self.retry_count >= self.max_retries
    }

    /// Eligible for the retry sweep at `now`
    pub fn is_retry_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Failed
            && self.retry_count < self.max_retries
            && self.next_retry_at.is_some_and(|at| at <= now)
    }

    /// Apply a worker outcome in place. Only valid from `Pending`; returns
    /// `false` and leaves the record untouched otherwise.
    pub fn apply(&mut self, update: &DeliveryUpdate) -> bool {
        if self.status != DeliveryStatus::Pending {
            return false;
        }

        match update {
            DeliveryUpdate::Sent {
                at,
                provider_message_id,
                provider_response,
            } => {
                self.status = DeliveryStatus::Sent;
                self.sent_at = Some(*at);
                self.error_message = None;
                self.next_retry_at = None;
                self.provider_message_id = provider_message_id.clone();
                self.provider_response = provider_response.clone();
                self.updated_at = *at;
            }
            DeliveryUpdate::Failed {
                at,
                error,
                retry_at,
                provider_response,
            } => {
                self.status = DeliveryStatus::Failed;
                self.error_message = Some(error.clone());
                self.retry_count = (self.retry_count + 1).min(self.max_retries);
                self.next_retry_at = if self.retry_count < self.max_retries {
                    Some(*retry_at)
                } else {
                    None
                };
                self.provider_response = provider_response.clone();
                self.updated_at = *at;
            }
            DeliveryUpdate::Abandoned { at, error } => {
                self.status = DeliveryStatus::Failed;
                self.error_message = Some(error.clone());
                self.retry_count = self.max_retries;
                self.next_retry_at = None;
                self.updated_at = *at;
            }
        }
        true
    }

    /// Failed -> Pending for the retry sweep. Returns `false` if not eligible.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_retry_eligible(now) {
            return false;
        }
        self.status = DeliveryStatus::Pending;
        self.next_retry_at = None;
        self.updated_at = now;
        true
    }
}

/// Single atomic outcome recorded by the delivery worker for one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryUpdate {
    Sent {
        at: DateTime<Utc>,
        provider_message_id: Option<String>,
        provider_response: Option<serde_json::Value>,
    },
    Failed {
        at: DateTime<Utc>,
        error: String,
        /// Applied only while retries remain after this failure
        retry_at: DateTime<Utc>,
        provider_response: Option<serde_json::Value>,
    },
    /// Nothing left to send: fail terminally without spending retries
    Abandoned { at: DateTime<Utc>, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn failed_update(now: DateTime<Utc>) -> DeliveryUpdate {
        DeliveryUpdate::Failed {
            at: now,
            error: "provider returned HTTP 503".to_string(),
            retry_at: now + Duration::minutes(5),
            provider_response: None,
        }
    }

    #[test]
    fn test_new_delivery_is_pending() {
        let d = NotificationDelivery::new(Uuid::new_v4(), Channel::Email, vec![], 3);
        assert_eq!(d.status, DeliveryStatus::Pending);
        assert_eq!(d.retry_count, 0);
        assert!(!d.is_exhausted());
    }

    #[test]
    fn test_apply_sent() {
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Email, vec![], 3);
        let now = Utc::now();

        assert!(d.apply(&DeliveryUpdate::Sent {
            at: now,
            provider_message_id: Some("msg-1".to_string()),
            provider_response: None,
        }));
        assert_eq!(d.status, DeliveryStatus::Sent);
        assert_eq!(d.sent_at, Some(now));
        assert_eq!(d.provider_message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn test_apply_only_from_pending() {
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Email, vec![], 3);
        let now = Utc::now();

        assert!(d.apply(&failed_update(now)));
        let snapshot = d.clone();
        assert!(!d.apply(&failed_update(now)));
        assert_eq!(d, snapshot);
    }

    #[test]
    fn test_failure_schedules_retry_until_exhausted() {
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Push, vec![], 3);
        let now = Utc::now();

        for attempt in 1..=3 {
            assert!(d.apply(&failed_update(now)));
            assert_eq!(d.retry_count, attempt);
            if attempt < 3 {
                assert_eq!(d.next_retry_at, Some(now + Duration::minutes(5)));
                assert!(d.reset_for_retry(now + Duration::minutes(6)));
            }
        }

        assert!(d.is_exhausted());
        assert_eq!(d.next_retry_at, None);
        assert!(!d.reset_for_retry(now + Duration::days(365)));
    }

    #[test]
    fn test_retry_not_eligible_before_next_retry_at() {
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Email, vec![], 3);
        let now = Utc::now();
        d.apply(&failed_update(now));

        assert!(!d.is_retry_eligible(now + Duration::minutes(4)));
        assert!(d.is_retry_eligible(now + Duration::minutes(5)));
    }

    #[test]
    fn test_exhausted_with_stale_retry_time_is_not_eligible() {
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Email, vec![], 3);
        d.status = DeliveryStatus::Failed;
        d.retry_count = 3;
        d.next_retry_at = Some(Utc::now() - Duration::days(1));

        assert!(d.is_exhausted());
        assert!(!d.is_retry_eligible(Utc::now()));
    }

    #[test]
    fn test_channel_and_status_parse() {
        assert_eq!("in_app".parse::<Channel>().unwrap(), Channel::InApp);
        assert_eq!(
            "failed".parse::<DeliveryStatus>().unwrap(),
            DeliveryStatus::Failed
        );
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn test_apply_abandoned_is_terminal() {
        let now = Utc::now();
        let mut d = NotificationDelivery::new(Uuid::new_v4(), Channel::Push, vec!["tok".into()], 3);
        assert!(d.apply(&DeliveryUpdate::Abandoned {
            at: now,
            error: "notification gone".into(),
        }));

        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.retry_count, 3);
        assert!(d.next_retry_at.is_none());
        assert!(d.is_exhausted());
        assert!(!d.is_retry_eligible(now + Duration::days(1)));
    }
}
