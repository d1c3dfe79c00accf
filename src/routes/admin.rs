//! Operator routes
//!
//! Recovery paths for payments the automatic flow could not settle:
//! - run the payout sweep now
//! - retry a failed payout or capture on one job
//! - read the operator alert feed
//!
//! All routes require admin privileges (is_admin flag on profile).

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
use crate::auth::RequireAdmin;
use crate::domain::Job;
use crate::error::ApiError;
use crate::lifecycle::PayoutOutcome;
use crate::services::notifications;
use crate::sweep::run_payout_sweep;

#[derive(Debug, Deserialize, Default)]
pub struct AlertQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Serialize)]
pub struct PayoutRetry {
    pub job: Job,
    pub payout: PayoutOutcome,
}

#[derive(Serialize)]
pub struct CaptureRetry {
    pub job: Job,
    pub capture_error: Option<String>,
}

/// POST /admin/payout-sweep
pub async fn run_sweep(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(admin_id = %admin.admin_id(), "Manual payout sweep requested");
    let report = run_payout_sweep(&state.lifecycle, state.settings.payout_sweep_batch_size).await;
    Ok(Json(DataResponse::new(report)))
}

/// POST /admin/jobs/:job_id/retry-payout
pub async fn retry_payout(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(admin_id = %admin.admin_id(), job_id = %job_id, "Payout retry requested");
    let (job, payout) = state.lifecycle.retry_payout(job_id).await?;
    Ok(Json(DataResponse::new(PayoutRetry { job, payout })))
}

/// POST /admin/jobs/:job_id/retry-capture
pub async fn retry_capture(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(admin_id = %admin.admin_id(), job_id = %job_id, "Capture retry requested");
    let (job, capture_error) = state.lifecycle.retry_capture(job_id).await?;
    Ok(Json(DataResponse::new(CaptureRetry { job, capture_error })))
}

/// GET /admin/alerts
pub async fn list_alerts(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    };

    let (alerts, total) = notifications::list_operator_alerts(
        &state.db,
        query.include_resolved,
        params.limit(),
        params.offset(),
    )
    .await?;

    Ok(Paginated::new(alerts, &params, total.max(0) as u64))
}
