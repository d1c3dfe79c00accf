//! Signing keys for access token verification
//!
//! Keys are fetched from the identity provider's JWKS endpoint and kept for
//! a TTL. An unknown `kid` forces a refetch, rate limited so a flood of bad
//! tokens cannot hammer the provider.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Claims;

const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Default)]
struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    fn fresh_key(&self, kid: &str, ttl: Duration) -> Option<DecodingKey> {
        let fetched_at = self.fetched_at?;
        if fetched_at.elapsed() >= ttl {
            return None;
        }
        self.keys.get(kid).cloned()
    }

    fn recently_fetched(&self) -> bool {
        self.fetched_at
            .is_some_and(|at| at.elapsed() < MIN_REFETCH_INTERVAL)
    }
}

#[derive(Clone)]
pub struct JwksCache {
    keys: Arc<RwLock<KeySet>>,
    http: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwksCache {
    pub fn new(
        http: reqwest::Client,
        jwks_url: String,
        issuer: String,
        audience: String,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            keys: Arc::new(RwLock::new(KeySet::default())),
            http,
            jwks_url,
            issuer,
            audience,
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Verify an RS256 access token and return its claims.
    pub async fn verify_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).context("Invalid JWT header")?;
        let kid = header.kid.context("JWT missing kid header")?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_nbf = true;

        let data = decode::<Claims>(token, &key, &validation).context("JWT validation failed")?;
        Ok(data.claims)
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.keys.read().fresh_key(kid, self.ttl) {
            return Ok(key);
        }

        self.refresh().await?;

        self.keys
            .read()
            .keys
            .get(kid)
            .cloned()
            .with_context(|| format!("Signing key {} not found in JWKS", kid))
    }

    async fn refresh(&self) -> Result<()> {
        if self.keys.read().recently_fetched() {
            return Ok(());
        }

        tracing::debug!(url = %self.jwks_url, "Fetching JWKS");

        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to fetch JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse JWKS")?;

        let mut keys = HashMap::new();
        for jwk in set.keys.into_iter().filter(|k| k.kty == "RSA") {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(err) => tracing::warn!(kid = %jwk.kid, error = %err, "Skipping unusable JWK"),
            }
        }

        let count = keys.len();
        *self.keys.write() = KeySet {
            keys,
            fetched_at: Some(Instant::now()),
        };

        tracing::info!(keys = count, "JWKS cache refreshed");
        Ok(())
    }

    /// Fetch keys ahead of the first request.
    pub async fn warm_cache(&self) -> Result<()> {
        self.refresh().await
    }
}
