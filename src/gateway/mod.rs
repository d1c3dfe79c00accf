//! Payment gateway adapter
//!
//! Stateless bridge to the payment processor. Every amount crossing this
//! boundary is a [`Money`] in minor units; errors are normalized into
//! [`GatewayError`] so callers only decide between "retry later" and
//! "needs an operator".

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AccountStatus, Money, OnboardingLink};

pub use stripe::StripeGateway;
pub use webhook::{WebhookError, WebhookVerifier};

/// Processor failure, classified by whether it is expected to clear on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Funds not yet settled, or a similar condition that resolves without
    /// operator action.
    #[error("{0}")]
    Transient(String),

    /// Anything else: restricted account, bad destination, network failure.
    #[error("{0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Fatal(m) => m,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classify a processor error by its code and message.
///
/// Only unsettled-balance failures are transient.
pub fn classify_failure(code: Option<&str>, message: &str) -> GatewayError {
    let insufficient_code = matches!(code, Some("balance_insufficient" | "insufficient_funds"));
    let lower = message.to_lowercase();
    let insufficient_message = lower.contains("insufficient") && lower.contains("funds");

    if insufficient_code || insufficient_message {
        GatewayError::Transient(message.to_string())
    } else {
        GatewayError::Fatal(message.to_string())
    }
}

/// Processor-side state of a charge authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    /// Funds are held and can be captured
    RequiresCapture,
    Canceled,
    Succeeded,
    Other(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Manual-capture authorization request
#[derive(Debug, Clone)]
pub struct AuthorizeCharge {
    pub job_id: Uuid,
    pub landlord_id: Uuid,
    pub amount: Money,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct ChargeAuthorization {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
}

/// Transfer to a cleaner's connect account
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination_account_id: String,
    pub amount: Money,
    pub currency: String,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub transfer_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_connect_account(
        &self,
        cleaner_id: Uuid,
        email: &str,
        country: &str,
    ) -> GatewayResult<AccountStatus>;

    async fn onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> GatewayResult<OnboardingLink>;

    async fn account_status(&self, account_id: &str) -> GatewayResult<AccountStatus>;

    async fn authorize_charge(&self, request: &AuthorizeCharge) -> GatewayResult<ChargeAuthorization>;

    async fn payment_intent_status(&self, payment_intent_id: &str) -> GatewayResult<IntentStatus>;

    /// Capture a previously authorized charge. Safe to repeat with the same key.
    async fn capture_authorized_charge(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()>;

    /// Release an authorization hold without charging.
    async fn cancel_authorization(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()>;

    async fn transfer_payout(&self, request: &TransferRequest) -> GatewayResult<Transfer>;
}
