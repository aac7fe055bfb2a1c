//! Notification data model.
//!
//! - `Notification`: one logical event delivered to one user
//! - `NotificationDelivery`: per-channel attempt tracking for a notification
//! - `UserPreference`: per-user channel opt-in configuration

mod delivery;
mod preference;
mod types;

pub use delivery::{Channel, DeliveryStatus, DeliveryUpdate, NotificationDelivery, DEFAULT_MAX_RETRIES};
pub use preference::{PreferenceUpdate, UserPreference};
pub use types::{
    Metadata, Notification, NotificationCategory, NotificationType, Recipient, RelatedIds,
};
