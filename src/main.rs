use anyhow::{Context, Result};
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;

use cleaning_marketplace::gateway::{StripeGateway, WebhookVerifier};
use cleaning_marketplace::lifecycle::{JobLifecycle, LifecycleConfig, SystemClock};
use cleaning_marketplace::services::{notifications, RedisTaskQueue};
use cleaning_marketplace::store::{self, PgJobStore};
use cleaning_marketplace::{app, auth, config, db, logging, sweep};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load and validate configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting cleaning marketplace backend"
    );

    // Database
    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    let job_store = Arc::new(PgJobStore::new(pool.clone()));
    store::seed_price_table(job_store.as_ref()).await?;

    // Background task queue
    let tasks = RedisTaskQueue::new(&settings.redis_url).await?;

    // Payment processor
    let gateway = StripeGateway::new(
        &settings.stripe_api_base,
        &settings.stripe_secret_key,
        settings.stripe_timeout_seconds,
    )?;
    let webhooks = WebhookVerifier::new(&settings.stripe_webhook_secret);

    let offset = FixedOffset::east_opt(settings.business_utc_offset_minutes * 60)
        .context("BUSINESS_UTC_OFFSET_MINUTES is out of range")?;

    let lifecycle = Arc::new(JobLifecycle::new(
        job_store,
        Arc::new(gateway),
        Arc::new(tasks.clone()),
        Arc::new(SystemClock::new(offset)),
        LifecycleConfig {
            platform_fee_bps: settings.platform_fee_bps,
            currency: settings.currency.clone(),
            connect_return_url: settings.stripe_connect_return_url.clone(),
            connect_refresh_url: settings.stripe_connect_refresh_url.clone(),
        },
    ));

    // Shared HTTP client for identity provider calls
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    let jwks_cache = auth::JwksCache::new(
        http_client,
        settings.supabase_jwt_jwks_url.clone(),
        settings.supabase_jwt_issuer.clone(),
        settings.supabase_jwt_audience.clone(),
        settings.jwks_cache_ttl_seconds,
    );

    if let Err(e) = jwks_cache.warm_cache().await {
        tracing::warn!(error = %e, "Failed to warm JWKS cache - will fetch on first request");
    }

    // Daily payout sweep
    let scheduler = if settings.payout_sweep_enabled {
        let sched = sweep::build_sweep_scheduler(
            lifecycle.clone(),
            &settings.payout_sweep_cron,
            settings.payout_sweep_batch_size,
        )
        .await?;
        sched.start().await.context("Failed to start scheduler")?;
        tracing::info!(cron = %settings.payout_sweep_cron, "Payout sweep scheduled");
        Some(sched)
    } else {
        tracing::info!("Payout sweep disabled");
        None
    };

    // Task worker
    if settings.task_worker_enabled {
        tokio::spawn(notifications::run_task_worker(
            tasks.clone(),
            pool.clone(),
            settings.task_max_attempts,
        ));
    }

    let state = app::AppState::new(
        pool,
        settings.clone(),
        jwks_cache,
        lifecycle,
        webhooks,
        tasks,
    );
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(mut sched) = scheduler {
        if let Err(e) = sched.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
    }

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
