//! Cleaning job routes
//!
//! Booking, editing and progressing jobs. Every handler delegates to the
//! lifecycle, which owns the ownership and state checks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::pagination::PaginationParams;
use crate::api::{DataResponse, Paginated};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{CompleteJobInput, CreateJobInput, JobScope, UpdateJobInput};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// `landlord` (default), `cleaner` or `open`
    #[serde(default)]
    pub scope: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// POST /jobs
pub async fn create_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateJobInput>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.create_job(auth.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(job))))
}

/// GET /jobs?scope=landlord|cleaner|open
pub async fn list_jobs(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = match query.scope.as_deref().unwrap_or("landlord") {
        "landlord" => JobScope::Landlord(auth.user_id),
        "cleaner" => JobScope::Cleaner(auth.user_id),
        "open" => JobScope::Open {
            from: state.lifecycle.clock().today(),
        },
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown scope '{}', expected landlord, cleaner or open",
                other
            )))
        }
    };

    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };
    let (jobs, total) = state
        .lifecycle
        .list_jobs(scope, params.limit(), params.offset())
        .await?;

    Ok(Paginated::new(jobs, &params, total))
}

/// GET /jobs/:job_id
pub async fn get_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.get_job(job_id, auth.user_id).await?;
    Ok(Json(DataResponse::new(job)))
}

/// PATCH /jobs/:job_id
pub async fn update_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    Json(input): Json<UpdateJobInput>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.update_job(job_id, auth.user_id, input).await?;
    Ok(Json(DataResponse::new(job)))
}

/// POST /jobs/:job_id/cancel
pub async fn cancel_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.cancel_job(job_id, auth.user_id).await?;
    Ok(Json(DataResponse::new(job)))
}

/// POST /jobs/:job_id/authorize-payment
///
/// Places the hold and returns the client secret the browser confirms.
pub async fn authorize_payment(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization = state
        .lifecycle
        .authorize_job_payment(job_id, auth.user_id)
        .await?;
    Ok(Json(DataResponse::new(authorization)))
}

/// POST /jobs/:job_id/start
///
/// Succeeds once the job is in progress; a failed capture comes back in
/// `capture_error`.
pub async fn start_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .lifecycle
        .start_job_and_capture_payment(job_id, auth.user_id)
        .await?;
    Ok(Json(DataResponse::new(outcome)))
}

/// POST /jobs/:job_id/complete
pub async fn complete_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    input: Option<Json<CompleteJobInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let outcome = state
        .lifecycle
        .complete_job_and_payout(job_id, auth.user_id, input)
        .await?;
    Ok(Json(DataResponse::new(outcome)))
}
