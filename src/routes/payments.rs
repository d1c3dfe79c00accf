//! Cleaner payout account routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{CreateConnectAccountInput, OnboardingLinkInput};
use crate::error::ApiError;

/// POST /payments/connect-account
///
/// Returns the existing account when the cleaner already has one.
pub async fn create_connect_account(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateConnectAccountInput>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .lifecycle
        .create_connect_account(auth.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(account))))
}

/// POST /payments/onboarding-link
pub async fn onboarding_link(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    input: Option<Json<OnboardingLinkInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let link = state.lifecycle.onboarding_link(auth.user_id, input).await?;
    Ok(Json(DataResponse::new(link)))
}

/// GET /payments/account-status
///
/// Refreshes the mirror from the processor before answering.
pub async fn account_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.lifecycle.refresh_account_status(auth.user_id).await?;
    Ok(Json(DataResponse::new(account)))
}
