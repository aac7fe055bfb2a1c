//! Preference toggles and device token registration.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::notification::{PreferenceUpdate, UserPreference};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct DeviceTokenRequest {
    pub token: String,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreference>> {
    Ok(Json(state.store.get_or_create_preference(&user_id).await?))
}

/// Partial update: absent toggles keep their value
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<UserPreference>> {
    let pref = state.store.update_preference(&user_id, &update).await?;
    tracing::info!(user_id = %user_id, "Preferences updated");
    Ok(Json(pref))
}

pub async fn add_device(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<DeviceTokenRequest>,
) -> Result<Json<UserPreference>> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("token must not be empty".into()));
    }

    let pref = state.store.add_device_token(&user_id, token).await?;
    tracing::info!(
        user_id = %user_id,
        devices = pref.device_tokens.len(),
        "Device token registered"
    );
    Ok(Json(pref))
}

pub async fn remove_device(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(String, String)>,
) -> Result<Json<UserPreference>> {
    let pref = state.store.remove_device_token(&user_id, &token).await?;
    tracing::info!(user_id = %user_id, "Device token removed");
    Ok(Json(pref))
}
