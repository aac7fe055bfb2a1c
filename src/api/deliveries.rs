//! Delivery inspection for operators.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::notification::NotificationDelivery;
use crate::server::AppState;

const DEFAULT_EXHAUSTED_LIMIT: usize = 50;
const MAX_EXHAUSTED_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ExhaustedParams {
    pub limit: Option<usize>,
}

pub async fn notification_deliveries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<NotificationDelivery>>> {
    if state.store.get_notification(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(Json(state.store.deliveries_for(id).await?))
}

/// Permanently failed deliveries, most recently updated first
pub async fn exhausted_deliveries(
    State(state): State<AppState>,
    Query(params): Query<ExhaustedParams>,
) -> Result<Json<Vec<NotificationDelivery>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EXHAUSTED_LIMIT)
        .clamp(1, MAX_EXHAUSTED_LIMIT);
    Ok(Json(state.store.exhausted_deliveries(limit).await?))
}
