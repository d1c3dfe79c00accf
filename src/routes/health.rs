use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub task_queue: String,
    /// Tasks waiting for the worker, when the queue answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_tasks: Option<u64>,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_ok, queue_result, depth) = tokio::join!(
        db::health_check(&state.db),
        state.tasks.health_check(),
        state.tasks.depth(),
    );

    // The database is critical; a dead queue only delays notifications
    let status = match (db_ok, queue_result.is_ok()) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: if db_ok { "ok" } else { "error" }.to_string(),
                task_queue: if queue_result.is_ok() { "ok" } else { "error" }.to_string(),
                queued_tasks: depth.ok(),
            },
        }),
    )
}
