//! Notification routes
//!
//! In-app notifications produced by job events: list and mark read.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::pagination::PaginationParams;
use crate::api::{DataResponse, Paginated};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::services::notifications;

#[derive(Debug, Deserialize, Default)]
pub struct NotificationQueryParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// GET /notifications
pub async fn list_notifications(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };

    let (data, total) = notifications::list_notifications(
        &state.db,
        auth.user_id,
        query.unread_only,
        params.limit(),
        params.offset(),
    )
    .await?;

    Ok(Paginated::new(data, &params, total.max(0) as u64))
}

/// POST /notifications/:id/read
pub async fn mark_notification_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let found =
        notifications::mark_notification_read(&state.db, auth.user_id, notification_id).await?;
    if !found {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(DataResponse::new(MarkedRead { updated: 1 })))
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = notifications::mark_all_read(&state.db, auth.user_id).await?;
    Ok(Json(DataResponse::new(MarkedRead { updated })))
}
