//! Payment processor webhook events
//!
//! Raw webhook bodies are parsed into this closed set before anything
//! reaches the lifecycle. Unknown event types map to `Ignored`.

use serde::Serialize;

use super::accounts::AccountStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    AccountUpdated {
        status: AccountStatus,
    },
    /// Funds are held and can be captured
    PaymentAuthorized {
        payment_intent_id: String,
    },
    PaymentSucceeded {
        payment_intent_id: String,
    },
    PaymentFailed {
        payment_intent_id: String,
        reason: Option<String>,
    },
    ChargeRefunded {
        payment_intent_id: String,
    },
    Ignored {
        event_type: String,
    },
}

/// A verified webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub event_id: String,
    pub event: WebhookEvent,
}

impl WebhookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountUpdated { .. } => "account_updated",
            Self::PaymentAuthorized { .. } => "payment_authorized",
            Self::PaymentSucceeded { .. } => "payment_succeeded",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::ChargeRefunded { .. } => "charge_refunded",
            Self::Ignored { .. } => "ignored",
        }
    }
}
