//! Domain event intake.
//!
//! Callers post the entity state captured around their write. Every route
//! answers 202: composition is a best-effort side channel and never fails
//! the emitter. An optional `X-Event-Id` header makes a retried post a
//! no-op that returns the ids composed the first time.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::Result;
use crate::listeners::{ListingSnapshot, MerchantSnapshot, OrderSnapshot, StateChange};
use crate::server::AppState;

use super::notifications::IntakeResponse;

const EVENT_ID_HEADER: &str = "x-event-id";

/// Emitter event id, ignoring blank values
pub(super) fn event_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

fn accepted(notification_ids: Vec<uuid::Uuid>) -> Result<(StatusCode, Json<IntakeResponse>)> {
    Ok((StatusCode::ACCEPTED, Json(IntakeResponse { notification_ids })))
}

pub async fn order_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(order): Json<OrderSnapshot>,
) -> Result<(StatusCode, Json<IntakeResponse>)> {
    accepted(state.listeners.order_created(&order, event_id(&headers)).await)
}

pub async fn order_status_changed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(change): Json<StateChange<OrderSnapshot>>,
) -> Result<(StatusCode, Json<IntakeResponse>)> {
    accepted(
        state
            .listeners
            .order_status_changed(&change, event_id(&headers))
            .await,
    )
}

pub async fn merchant_changed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(change): Json<StateChange<MerchantSnapshot>>,
) -> Result<(StatusCode, Json<IntakeResponse>)> {
    accepted(
        state
            .listeners
            .merchant_changed(&change, event_id(&headers))
            .await,
    )
}

pub async fn listing_changed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(change): Json<StateChange<ListingSnapshot>>,
) -> Result<(StatusCode, Json<IntakeResponse>)> {
    accepted(
        state
            .listeners
            .listing_changed(&change, event_id(&headers))
            .await,
    )
}
