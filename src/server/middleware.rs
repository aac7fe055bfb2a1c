use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::AppError;

/// API key authentication for event intake.
/// Validates the X-API-Key header against the configured `api.key`.
pub async fn api_key_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    // No key configured: intake is open (development mode)
    let Some(expected_key) = &state.settings.api.key else {
        return next.run(req).await;
    };

    let api_key = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if key == expected_key => next.run(req).await,
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            AppError::Unauthorized("Invalid API key".into()).into_response()
        }
        None => {
            tracing::warn!("Missing API key header");
            AppError::Unauthorized("Missing X-API-Key header".into()).into_response()
        }
    }
}
