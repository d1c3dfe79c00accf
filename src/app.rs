use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::JwksCache;
use crate::config::Settings;
use crate::gateway::WebhookVerifier;
use crate::lifecycle::JobLifecycle;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::RedisTaskQueue;

/// Largest accepted request body. Webhook payloads are the biggest we see.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub jwks_cache: JwksCache,
    pub lifecycle: Arc<JobLifecycle>,
    pub webhooks: WebhookVerifier,
    /// Kept for health checks; the lifecycle enqueues through its own handle
    pub tasks: RedisTaskQueue,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        jwks_cache: JwksCache,
        lifecycle: Arc<JobLifecycle>,
        webhooks: WebhookVerifier,
        tasks: RedisTaskQueue,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            settings,
            jwks_cache,
            lifecycle,
            webhooks,
            tasks,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Routes at root level, no /api prefix
    with_middleware(Router::new().merge(routes::api_router()), cors).with_state(state)
}

fn with_middleware<S>(router: Router<S>, cors: CorsLayer) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let (set_request_id, propagate_request_id) = request_id_layer();

    // Middleware stack (applied bottom-up)
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // In dev mode, use longer preflight cache to reduce OPTIONS requests
    let max_age = if settings.env.is_dev() {
        // Cache preflight for 24 hours in development
        std::time::Duration::from_secs(86400)
    } else {
        // 1 hour in production
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes},
        http::{Request, StatusCode},
        routing::post,
    };
    use tower::ServiceExt;

    fn echo() -> Router {
        let router = Router::new().route(
            "/echo",
            post(|body: Bytes| async move { body.len().to_string() }),
        );
        with_middleware(router, CorsLayer::new())
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::post("/echo")
            .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
            .unwrap();

        let response = echo().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let request = Request::post("/echo")
            .body(Body::from(vec![b'x'; 1024]))
            .unwrap();

        let response = echo().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }
}
