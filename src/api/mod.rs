//! API layer - HTTP endpoint handlers organized by domain.

mod deliveries;
mod events;
mod health;
mod metrics;
mod notifications;
mod preferences;
mod routes;

pub use deliveries::{exhausted_deliveries, notification_deliveries};
pub use events::{listing_changed, merchant_changed, order_created, order_status_changed};
pub use health::health;
pub use metrics::prometheus_metrics;
pub use notifications::{
    compose_notification, list_notifications, mark_all_read, mark_read, unread_count,
    ComposeNotificationRequest, IntakeResponse,
};
pub use preferences::{add_device, get_preferences, remove_device, update_preferences};
pub use routes::api_routes;
