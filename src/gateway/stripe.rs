//! Stripe Connect client.
//!
//! Form-encoded calls against the Stripe REST API. Calls that carry an
//! idempotency key, and plain reads, are retried with exponential backoff
//! on network errors, 429 and 5xx responses. Everything else is attempted
//! once.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{TimeZone, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{
    classify_failure, AuthorizeCharge, ChargeAuthorization, GatewayError, GatewayResult,
    IntentStatus, PaymentGateway, Transfer, TransferRequest,
};
use crate::domain::{AccountStatus, OnboardingLink};

/// Upper bound on time spent retrying one call.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(20);

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StripeRequirements {
    #[serde(default)]
    pub disabled_reason: Option<String>,
}

/// Account object, as returned by the API and embedded in `account.updated`.
#[derive(Debug, Deserialize)]
pub(crate) struct StripeAccount {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub requirements: Option<StripeRequirements>,
}

impl From<StripeAccount> for AccountStatus {
    fn from(account: StripeAccount) -> Self {
        Self {
            account_id: account.id,
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            details_submitted: account.details_submitted,
            disabled_reason: account.requirements.and_then(|r| r.disabled_reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeTransfer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeAccountLink {
    url: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

// ============================================================================
// Client
// ============================================================================

/// Stripe implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(base_url: &str, secret_key: &str, timeout_seconds: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        tracing::info!(base_url = base_url, "Stripe client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    /// Send one API call, retrying transport failures when it is safe to.
    async fn call<R: DeserializeOwned + Send>(
        &self,
        method: Method,
        path: &str,
        form: Vec<(String, String)>,
        idempotency_key: Option<&str>,
    ) -> GatewayResult<R> {
        let url = format!("{}{}", self.base_url, path);
        let retryable = method == Method::GET || idempotency_key.is_some();

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();

        let (method, url, form) = (&method, &url, &form);

        backoff::future::retry(policy, move || async move {
            let mut req = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.secret_key);

            if let Some(key) = idempotency_key {
                req = req.header("Idempotency-Key", key);
            }
            if !form.is_empty() {
                req = req.form(form);
            }

            debug!(method = %method, url = %url, "Stripe request");

            let response = req.send().await.map_err(|e| {
                let err = GatewayError::Fatal(format!("payment processor unreachable: {}", e));
                if retryable && (e.is_timeout() || e.is_connect()) {
                    warn!(error = %e, url = %url, "Stripe request failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    error!(error = %e, url = %url, "Stripe request failed");
                    backoff::Error::permanent(err)
                }
            })?;

            let status = response.status();

            if status.is_success() {
                return response.json::<R>().await.map_err(|e| {
                    error!(error = %e, "Failed to parse Stripe response");
                    backoff::Error::permanent(GatewayError::Fatal(format!(
                        "invalid payment processor response: {}",
                        e
                    )))
                });
            }

            let body = response.json::<StripeErrorEnvelope>().await.ok();
            let code = body.as_ref().and_then(|b| b.error.code.clone());
            let message = body
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("payment processor error: {}", status));

            let err = classify_failure(code.as_deref(), &message);

            if retryable && (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()) {
                warn!(status = %status, message = %message, "Stripe unavailable, retrying");
                Err(backoff::Error::transient(err))
            } else {
                warn!(status = %status, code = ?code, message = %message, "Stripe rejected request");
                Err(backoff::Error::permanent(err))
            }
        })
        .await
    }
}

fn field(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, email))]
    async fn create_connect_account(
        &self,
        cleaner_id: Uuid,
        email: &str,
        country: &str,
    ) -> GatewayResult<AccountStatus> {
        let form = vec![
            field("type", "express"),
            field("country", country),
            field("email", email),
            field("capabilities[transfers][requested]", "true"),
            field("metadata[cleaner_id]", cleaner_id),
        ];
        let key = format!("connect-account-{}", cleaner_id);

        let account: StripeAccount = self
            .call(Method::POST, "/v1/accounts", form, Some(&key))
            .await?;

        Ok(account.into())
    }

    #[instrument(skip(self))]
    async fn onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> GatewayResult<OnboardingLink> {
        let form = vec![
            field("account", account_id),
            field("return_url", return_url),
            field("refresh_url", refresh_url),
            field("type", "account_onboarding"),
        ];

        let link: StripeAccountLink = self
            .call(Method::POST, "/v1/account_links", form, None)
            .await?;

        Ok(OnboardingLink {
            url: link.url,
            expires_at: link
                .expires_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    #[instrument(skip(self))]
    async fn account_status(&self, account_id: &str) -> GatewayResult<AccountStatus> {
        let account: StripeAccount = self
            .call(Method::GET, &format!("/v1/accounts/{}", account_id), Vec::new(), None)
            .await?;

        Ok(account.into())
    }

    #[instrument(skip(self, request), fields(job_id = %request.job_id))]
    async fn authorize_charge(&self, request: &AuthorizeCharge) -> GatewayResult<ChargeAuthorization> {
        let form = vec![
            field("amount", request.amount.minor()),
            field("currency", request.currency.to_lowercase()),
            field("capture_method", "manual"),
            field("automatic_payment_methods[enabled]", "true"),
            field("metadata[job_id]", request.job_id),
            field("metadata[landlord_id]", request.landlord_id),
        ];

        let intent: StripePaymentIntent = self
            .call(
                Method::POST,
                "/v1/payment_intents",
                form,
                Some(&request.idempotency_key),
            )
            .await?;

        Ok(ChargeAuthorization {
            status: IntentStatus::parse(&intent.status),
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn payment_intent_status(&self, payment_intent_id: &str) -> GatewayResult<IntentStatus> {
        let intent: StripePaymentIntent = self
            .call(
                Method::GET,
                &format!("/v1/payment_intents/{}", payment_intent_id),
                Vec::new(),
                None,
            )
            .await?;

        Ok(IntentStatus::parse(&intent.status))
    }

    #[instrument(skip(self))]
    async fn capture_authorized_charge(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()> {
        let intent: StripePaymentIntent = self
            .call(
                Method::POST,
                &format!("/v1/payment_intents/{}/capture", payment_intent_id),
                Vec::new(),
                Some(idempotency_key),
            )
            .await?;

        match IntentStatus::parse(&intent.status) {
            IntentStatus::Succeeded | IntentStatus::Processing => Ok(()),
            other => Err(GatewayError::Fatal(format!(
                "capture left payment in unexpected state {:?}",
                other
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn cancel_authorization(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()> {
        let _: StripePaymentIntent = self
            .call(
                Method::POST,
                &format!("/v1/payment_intents/{}/cancel", payment_intent_id),
                vec![field("cancellation_reason", "abandoned")],
                Some(idempotency_key),
            )
            .await?;

        Ok(())
    }

    #[instrument(skip(self, request), fields(destination = %request.destination_account_id))]
    async fn transfer_payout(&self, request: &TransferRequest) -> GatewayResult<Transfer> {
        let mut form = vec![
            field("amount", request.amount.minor()),
            field("currency", request.currency.to_lowercase()),
            field("destination", &request.destination_account_id),
        ];
        form.extend(
            request
                .metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{}]", k), v.clone())),
        );

        let transfer: StripeTransfer = self
            .call(
                Method::POST,
                "/v1/transfers",
                form,
                Some(&request.idempotency_key),
            )
            .await?;

        Ok(Transfer {
            transfer_id: transfer.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_requirements_map_to_disabled_reason() {
        let account: StripeAccount = serde_json::from_value(serde_json::json!({
            "id": "acct_1",
            "charges_enabled": false,
            "payouts_enabled": false,
            "details_submitted": true,
            "requirements": { "disabled_reason": "requirements.past_due" }
        }))
        .unwrap();

        let status = AccountStatus::from(account);
        assert_eq!(status.account_id, "acct_1");
        assert!(status.details_submitted);
        assert_eq!(status.disabled_reason.as_deref(), Some("requirements.past_due"));
    }

    #[test]
    fn missing_flags_default_to_disabled() {
        let account: StripeAccount =
            serde_json::from_value(serde_json::json!({ "id": "acct_2" })).unwrap();
        let status = AccountStatus::from(account);
        assert!(!status.payouts_enabled);
        assert_eq!(status.disabled_reason, None);
    }

    #[test]
    fn error_envelope_parses_code() {
        let body: StripeErrorEnvelope = serde_json::from_value(serde_json::json!({
            "error": { "code": "balance_insufficient", "message": "Insufficient funds", "type": "invalid_request_error" }
        }))
        .unwrap();
        assert_eq!(body.error.code.as_deref(), Some("balance_insufficient"));
    }
}
