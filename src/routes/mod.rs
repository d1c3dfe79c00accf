pub mod admin;
pub mod health;
pub mod jobs;
pub mod me;
pub mod notifications;
pub mod payments;
pub mod requests;
pub mod webhooks;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Protected routes
        .route("/me", get(me::get_me))
        // Jobs
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job).patch(jobs::update_job))
        .route("/jobs/:job_id/cancel", post(jobs::cancel_job))
        .route(
            "/jobs/:job_id/authorize-payment",
            post(jobs::authorize_payment),
        )
        .route("/jobs/:job_id/start", post(jobs::start_job))
        .route("/jobs/:job_id/complete", post(jobs::complete_job))
        // Cleaner requests
        .route(
            "/jobs/:job_id/requests",
            post(requests::request_job).get(requests::list_requests),
        )
        .route(
            "/jobs/:job_id/requests/:request_id/accept",
            post(requests::accept_request),
        )
        .route(
            "/requests/:request_id/withdraw",
            post(requests::withdraw_request),
        )
        // Payout accounts
        .route(
            "/payments/connect-account",
            post(payments::create_connect_account),
        )
        .route("/payments/onboarding-link", post(payments::onboarding_link))
        .route("/payments/account-status", get(payments::account_status))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/:notification_id/read",
            post(notifications::mark_notification_read),
        )
        // Operators
        .route("/admin/payout-sweep", post(admin::run_sweep))
        .route(
            "/admin/jobs/:job_id/retry-payout",
            post(admin::retry_payout),
        )
        .route(
            "/admin/jobs/:job_id/retry-capture",
            post(admin::retry_capture),
        )
        .route("/admin/alerts", get(admin::list_alerts))
}
