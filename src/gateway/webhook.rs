//! Stripe webhook verification and parsing.
//!
//! `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]` where each `v1` is
//! HMAC-SHA256 over `"{t}.{payload}"` keyed with the endpoint secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use super::stripe::StripeAccount;
use crate::domain::{WebhookEnvelope, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature does not match")]
    SignatureMismatch,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Verifies webhook deliveries against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }

    pub fn with_tolerance(mut self, seconds: i64) -> Self {
        self.tolerance_seconds = seconds;
        self
    }

    /// Check the signature header for `payload` as received at `now`.
    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;

        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedHeader)?)
                }
                Some(("v1", value)) => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let mac = self.mac(timestamp, payload)?;
        let matched = signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        if (now.timestamp() - timestamp).abs() > self.tolerance_seconds {
            return Err(WebhookError::Expired);
        }

        Ok(())
    }

    /// Verify, then parse into a typed event.
    pub fn parse(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookEnvelope, WebhookError> {
        self.verify(payload, header, now)?;
        parse_event(payload)
    }

    /// Produce a header value for `payload`. Used for tests and local tooling.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        let signature = self
            .mac(timestamp, payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={},v1={}", timestamp, signature)
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

// ============================================================================
// Event Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawPaymentIntent {
    id: String,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Debug, Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCharge {
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    refunded: bool,
}

fn object<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(value).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

/// Parse a raw event body into the closed [`WebhookEvent`] set.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEnvelope, WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let event = match raw.event_type.as_str() {
        "account.updated" => WebhookEvent::AccountUpdated {
            status: object::<StripeAccount>(raw.data.object)?.into(),
        },
        "payment_intent.amount_capturable_updated" => WebhookEvent::PaymentAuthorized {
            payment_intent_id: object::<RawPaymentIntent>(raw.data.object)?.id,
        },
        "payment_intent.succeeded" => WebhookEvent::PaymentSucceeded {
            payment_intent_id: object::<RawPaymentIntent>(raw.data.object)?.id,
        },
        "payment_intent.payment_failed" => {
            let intent = object::<RawPaymentIntent>(raw.data.object)?;
            WebhookEvent::PaymentFailed {
                payment_intent_id: intent.id,
                reason: intent.last_payment_error.and_then(|e| e.message),
            }
        }
        "charge.refunded" => {
            let charge = object::<RawCharge>(raw.data.object)?;
            match charge.payment_intent {
                // partial refunds leave the payment paid
                Some(payment_intent_id) if charge.refunded => {
                    WebhookEvent::ChargeRefunded { payment_intent_id }
                }
                _ => WebhookEvent::Ignored {
                    event_type: raw.event_type,
                },
            }
        }
        _ => WebhookEvent::Ignored {
            event_type: raw.event_type,
        },
    };

    Ok(WebhookEnvelope {
        event_id: raw.id,
        event,
    })
}
