use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Supabase Auth
    pub supabase_jwt_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub jwks_cache_ttl_seconds: u64,

    // Stripe
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub stripe_timeout_seconds: u64,
    pub stripe_connect_return_url: String,
    pub stripe_connect_refresh_url: String,

    // Business rules
    pub currency: String,
    pub platform_fee_bps: u32,
    pub business_utc_offset_minutes: i32,

    // Payout sweep
    pub payout_sweep_cron: String,
    pub payout_sweep_enabled: bool,
    pub payout_sweep_batch_size: i64,

    // Background tasks
    pub task_worker_enabled: bool,
    pub task_max_attempts: u32,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parsed("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Supabase Auth
        let supabase_jwt_jwks_url =
            env::var("SUPABASE_JWT_JWKS_URL").context("SUPABASE_JWT_JWKS_URL must be set")?;
        let supabase_jwt_issuer =
            env::var("SUPABASE_JWT_ISSUER").context("SUPABASE_JWT_ISSUER must be set")?;
        let supabase_jwt_audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());
        let jwks_cache_ttl_seconds = parsed("JWKS_CACHE_TTL_SECONDS", 1800); // 30 minutes

        // Stripe
        let stripe_secret_key =
            env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let stripe_webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;
        let stripe_api_base = env::var("STRIPE_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let stripe_timeout_seconds = parsed("STRIPE_TIMEOUT_SECONDS", 30);
        let stripe_connect_return_url = env::var("STRIPE_CONNECT_RETURN_URL")
            .unwrap_or_else(|_| "http://localhost:3000/cleaner/payouts/done".to_string());
        let stripe_connect_refresh_url = env::var("STRIPE_CONNECT_REFRESH_URL")
            .unwrap_or_else(|_| "http://localhost:3000/cleaner/payouts/refresh".to_string());

        // Business rules
        let currency = env::var("CURRENCY")
            .unwrap_or_else(|_| "nok".to_string())
            .trim()
            .to_lowercase();
        let platform_fee_bps = parsed("PLATFORM_FEE_BPS", 1000); // 10%
        let business_utc_offset_minutes = parsed("BUSINESS_UTC_OFFSET_MINUTES", 60);

        // Payout sweep, daily at 06:00 business time by default
        let payout_sweep_cron =
            env::var("PAYOUT_SWEEP_CRON").unwrap_or_else(|_| "0 0 5 * * *".to_string());
        let payout_sweep_enabled = flag("PAYOUT_SWEEP_ENABLED", true);
        let payout_sweep_batch_size = parsed("PAYOUT_SWEEP_BATCH_SIZE", 100);

        // Background tasks
        let task_worker_enabled = flag("TASK_WORKER_ENABLED", true);
        let task_max_attempts = parsed("TASK_MAX_ATTEMPTS", 5);

        let settings = Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            cors_allow_origins,
            supabase_jwt_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl_seconds,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base,
            stripe_timeout_seconds,
            stripe_connect_return_url,
            stripe_connect_refresh_url,
            currency,
            platform_fee_bps,
            business_utc_offset_minutes,
            payout_sweep_cron,
            payout_sweep_enabled,
            payout_sweep_batch_size,
            task_worker_enabled,
            task_max_attempts,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configuration the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.stripe_secret_key.starts_with("sk_") {
            bail!("STRIPE_SECRET_KEY must be a secret key (sk_...)");
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            bail!("STRIPE_WEBHOOK_SECRET must be a webhook signing secret (whsec_...)");
        }
        if self.platform_fee_bps > 10_000 {
            bail!("PLATFORM_FEE_BPS must be between 0 and 10000");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!("CURRENCY must be a three-letter ISO 4217 code");
        }
        if self.business_utc_offset_minutes.abs() > 14 * 60 {
            bail!("BUSINESS_UTC_OFFSET_MINUTES must be within +/- 14 hours");
        }
        if self.stripe_timeout_seconds == 0 {
            bail!("STRIPE_TIMEOUT_SECONDS must be positive");
        }
        if self.payout_sweep_batch_size <= 0 {
            bail!("PAYOUT_SWEEP_BATCH_SIZE must be positive");
        }
        if self.task_max_attempts == 0 {
            bail!("TASK_MAX_ATTEMPTS must be at least 1");
        }
        check_cron(&self.payout_sweep_cron).context("PAYOUT_SWEEP_CRON is invalid")?;
        Ok(())
    }
}

/// Six or seven whitespace separated fields, seconds first.
fn check_cron(expr: &str) -> Result<()> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if !(6..=7).contains(&fields.len()) {
        bail!(
            "expected 6 fields (sec min hour day month weekday), got {}",
            fields.len()
        );
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '*' | ',' | '-' | '/' | '?');
    if let Some(bad) = fields.iter().find(|f| !f.chars().all(allowed)) {
        bail!("unexpected characters in field '{}'", bad);
    }
    Ok(())
}
