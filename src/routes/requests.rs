//! Cleaner request routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::CreateRequestInput;
use crate::error::ApiError;

/// POST /jobs/:job_id/requests
pub async fn request_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    input: Option<Json<CreateRequestInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let request = state
        .lifecycle
        .request_job(job_id, auth.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(request))))
}

/// GET /jobs/:job_id/requests
///
/// Landlord only. Newest first, with cleaner details.
pub async fn list_requests(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state
        .lifecycle
        .list_requests_for_job(job_id, auth.user_id)
        .await?;
    Ok(Json(DataResponse::new(requests)))
}

/// POST /jobs/:job_id/requests/:request_id/accept
pub async fn accept_request(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((job_id, request_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let acceptance = state
        .lifecycle
        .accept_request(job_id, request_id, auth.user_id)
        .await?;
    Ok(Json(DataResponse::new(acceptance)))
}

/// POST /requests/:request_id/withdraw
pub async fn withdraw_request(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .lifecycle
        .withdraw_request(request_id, auth.user_id)
        .await?;
    Ok(Json(DataResponse::new(request)))
}
