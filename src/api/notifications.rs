//! Inbox endpoints and direct compose intake.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compose::{ComposeRequest, DispatchMode};
use crate::error::{AppError, Result};
use crate::notification::{Metadata, Notification, NotificationType, Recipient, RelatedIds};
use crate::server::AppState;
use crate::store::{ListQuery, Page};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        ListQuery::new(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(ListQuery::DEFAULT_PAGE_SIZE),
            params.unread_only,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub user_id: String,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub user_id: String,
    pub updated: u64,
}

/// Direct compose request for emitters without a dedicated event route
#[derive(Debug, Deserialize)]
pub struct ComposeNotificationRequest {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub related: RelatedIds,
    /// Leave deliveries for the dispatch sweep instead of enqueuing them
    #[serde(default)]
    pub deferred: bool,
}

/// Intake is always accepted; ids list what was actually composed
#[derive(Debug, Serialize, Deserialize)]
pub struct IntakeResponse {
    pub notification_ids: Vec<Uuid>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Notification>>> {
    let page = state
        .store
        .list_notifications(&user_id, params.into())
        .await?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UnreadCountResponse>> {
    let unread_count = state.store.unread_count(&user_id).await?;
    Ok(Json(UnreadCountResponse {
        user_id,
        unread_count,
    }))
}

/// Mark one notification read. Repeating it keeps the first `read_at`.
pub async fn mark_read(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, Uuid)>,
) -> Result<Json<Notification>> {
    state
        .store
        .mark_read(&user_id, id, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<MarkAllReadResponse>> {
    let updated = state.store.mark_all_read(&user_id, Utc::now()).await?;
    tracing::debug!(user_id = %user_id, updated, "Marked all notifications read");
    Ok(Json(MarkAllReadResponse { user_id, updated }))
}

pub async fn compose_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ComposeNotificationRequest>,
) -> Result<(StatusCode, Json<IntakeResponse>)> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".into()));
    }
    if request.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }

    let dispatch = if request.deferred {
        DispatchMode::Deferred
    } else {
        DispatchMode::Immediate
    };

    let mut compose = ComposeRequest::new(
        Recipient::new(request.user_id, request.email),
        request.notification_type,
        request.title,
        request.body,
    )
    .with_metadata(request.metadata)
    .with_related(request.related)
    .with_dispatch(dispatch);
    if let Some(event_id) = super::events::event_id(&headers) {
        compose = compose.with_event_id(event_id);
    }

    let notification_ids = state
        .composer
        .compose_best_effort(compose)
        .await
        .map(|composed| vec![composed.notification.id])
        .unwrap_or_default();

    Ok((StatusCode::ACCEPTED, Json(IntakeResponse { notification_ids })))
}
