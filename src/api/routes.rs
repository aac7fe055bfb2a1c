use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::deliveries::{exhausted_deliveries, notification_deliveries};
use super::events::{listing_changed, merchant_changed, order_created, order_status_changed};
use super::health::health;
use super::metrics::prometheus_metrics;
use super::notifications::{
    compose_notification, list_notifications, mark_all_read, mark_read, unread_count,
};
use super::preferences::{add_device, get_preferences, remove_device, update_preferences};

pub fn api_routes(state: &AppState) -> Router<AppState> {
    // Event intake, guarded by X-API-Key when api.key is set
    let intake = Router::new()
        .route("/notifications", post(compose_notification))
        .route("/events/orders/created", post(order_created))
        .route("/events/orders/status-changed", post(order_status_changed))
        .route("/events/merchants/changed", post(merchant_changed))
        .route("/events/listings/changed", post(listing_changed))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Inbox
                .route("/users/{user_id}/notifications", get(list_notifications))
                .route(
                    "/users/{user_id}/notifications/unread-count",
                    get(unread_count),
                )
                .route("/users/{user_id}/notifications/read-all", post(mark_all_read))
                .route("/users/{user_id}/notifications/{id}/read", post(mark_read))
                // Preferences & devices
                .route(
                    "/users/{user_id}/preferences",
                    get(get_preferences).put(update_preferences),
                )
                .route("/users/{user_id}/devices", post(add_device))
                .route("/users/{user_id}/devices/{token}", delete(remove_device))
                // Delivery inspection
                .route("/notifications/{id}/deliveries", get(notification_deliveries))
                .route("/deliveries/exhausted", get(exhausted_deliveries))
                .merge(intake),
        )
}
