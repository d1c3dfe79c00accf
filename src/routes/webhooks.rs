//! Payment processor webhook endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::error::ApiError;
use crate::lifecycle::WebhookOutcome;
use crate::middleware::RequestIdExt;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

/// POST /webhooks/stripe
///
/// The raw body is needed for the signature, so it is read as bytes and
/// parsed only after verification.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let envelope = state
        .webhooks
        .parse(&body, signature, Utc::now())
        .map_err(|e| {
            tracing::warn!(
                request_id = ?headers.request_id(),
                error = %e,
                "Rejected webhook delivery"
            );
            e
        })?;

    let outcome = state.lifecycle.apply_webhook_event(&envelope).await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
