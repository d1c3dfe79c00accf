//! Cleaning job domain types
//!
//! A job carries three independent status fields: the job itself, the
//! landlord's charge, and the cleaner's payout. Each one only moves
//! forward; the lifecycle module is the only writer.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::Money;

/// Error returned when a stored status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

// ============================================================================
// Statuses
// ============================================================================

/// Cleaning service offered on the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    BnbCleaning,
    DeepCleaning,
    MoveOutCleaning,
}

text_enum!(ServiceType, "service type", {
    BnbCleaning => "bnb-cleaning",
    DeepCleaning => "deep-cleaning",
    MoveOutCleaning => "move-out-cleaning",
});

/// Job status
///
/// `pending -> requested -> confirmed -> in-progress -> completed`, with
/// `cancelled` reachable from `pending` and `requested` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Requested,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

text_enum!(JobStatus, "job status", {
    Pending => "pending",
    Requested => "requested",
    Confirmed => "confirmed",
    InProgress => "in-progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses in which the job still accepts offers, edits and cancellation.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Requested)
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Requested)
                | (Pending, Confirmed)
                | (Requested, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Requested, Cancelled)
        )
    }
}

/// Status of the landlord's charge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Paid,
    Failed,
    Refunded,
    /// Authorization hold released after the job was cancelled
    Voided,
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Authorized => "authorized",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
    Voided => "voided",
});

impl PaymentStatus {
    pub fn can_transition_to(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Pending, Authorized)
                | (Pending, Paid)
                | (Pending, Failed)
                | (Authorized, Paid)
                | (Authorized, Failed)
                | (Authorized, Voided)
                // hold released before its confirmation was folded in
                | (Pending, Voided)
                // processor confirmed a charge after we recorded a failed capture
                | (Failed, Paid)
                | (Paid, Refunded)
        )
    }
}

/// Status of the cleaner's payout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PayoutStatus {
    Pending,
    Paid,
    Failed,
}

text_enum!(PayoutStatus, "payout status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
});

// ============================================================================
// Job
// ============================================================================

/// When the cleaning takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
}

/// Price split between the platform and the cleaner.
///
/// `platform_fee + cleaner_payout == total_price` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub total_price: Money,
    pub platform_fee: Money,
    pub cleaner_payout: Money,
}

impl PriceBreakdown {
    /// Split `total` using a platform fee expressed in basis points.
    pub fn from_total(total: Money, platform_fee_bps: u32) -> Self {
        let platform_fee = total.share_bps(platform_fee_bps.min(10_000));
        let cleaner_payout = total.checked_sub(platform_fee).unwrap_or(Money::ZERO);
        Self {
            total_price: total,
            platform_fee,
            cleaner_payout,
        }
    }
}

/// A scheduled cleaning engagement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub property_id: Uuid,
    pub service_type: ServiceType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub special_instructions: Option<String>,
    pub total_price: Money,
    pub platform_fee: Money,
    pub cleaner_payout: Money,
    pub assigned_cleaner_id: Option<Uuid>,

    pub status: JobStatus,
    pub payment_status: PaymentStatus,
    pub payout_status: PayoutStatus,

    pub stripe_payment_intent_id: Option<String>,
    pub stripe_transfer_id: Option<String>,

    pub capture_error: Option<String>,
    pub payout_pending_reason: Option<String>,
    pub payout_error: Option<String>,
    pub payout_attempts: i32,
    pub next_payout_attempt_at: Option<DateTime<Utc>>,

    pub rating: Option<i16>,
    pub feedback: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub payout_date: Option<DateTime<Utc>>,

    /// Optimistic concurrency token, bumped by every store write
    #[serde(skip)]
    pub version: i64,
}

impl Job {
    /// Build a freshly booked job. All three statuses start at `pending`.
    pub fn new(
        landlord_id: Uuid,
        property_id: Uuid,
        service_type: ServiceType,
        schedule: Schedule,
        special_instructions: Option<String>,
        pricing: PriceBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            landlord_id,
            property_id,
            service_type,
            scheduled_date: schedule.date,
            scheduled_time: schedule.time,
            special_instructions,
            total_price: pricing.total_price,
            platform_fee: pricing.platform_fee,
            cleaner_payout: pricing.cleaner_payout,
            assigned_cleaner_id: None,
            status: JobStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payout_status: PayoutStatus::Pending,
            stripe_payment_intent_id: None,
            stripe_transfer_id: None,
            capture_error: None,
            payout_pending_reason: None,
            payout_error: None,
            payout_attempts: 0,
            next_payout_attempt_at: None,
            rating: None,
            feedback: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            payout_date: None,
            version: 0,
        }
    }

    pub fn set_pricing(&mut self, pricing: PriceBreakdown) {
        self.total_price = pricing.total_price;
        self.platform_fee = pricing.platform_fee;
        self.cleaner_payout = pricing.cleaner_payout;
    }

    /// Edits and cancellation are only permitted before anyone is bound.
    pub fn is_editable(&self) -> bool {
        self.status.is_open() && self.assigned_cleaner_id.is_none()
    }

    /// Eligible for a payout attempt right now.
    pub fn payout_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Completed
            && self.payment_status == PaymentStatus::Paid
            && self.payout_status == PayoutStatus::Pending
            && self.next_payout_attempt_at.map_or(true, |at| at <= now)
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Pricing supplied by the landlord when booking
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PricingInput {
    /// Explicit total; the platform fee is derived from it.
    Total { total_price: Money },
    /// Quote from the price table using the property's size.
    Quote { property_size_sqm: u32 },
}

/// Create job input
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobInput {
    pub property_id: Uuid,
    pub service_type: ServiceType,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(flatten)]
    pub pricing: PricingInput,
}

/// Editable job fields. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateJobInput {
    #[serde(default)]
    pub service_type: Option<ServiceType>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub total_price: Option<Money>,
}

impl UpdateJobInput {
    pub fn is_empty(&self) -> bool {
        self.service_type.is_none()
            && self.scheduled_date.is_none()
            && self.scheduled_time.is_none()
            && self.special_instructions.is_none()
            && self.total_price.is_none()
    }
}

/// Completion details supplied by the cleaner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteJobInput {
    #[serde(default)]
    pub rating: Option<i16>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Which slice of jobs a caller wants to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobScope {
    /// Jobs booked by this landlord
    Landlord(Uuid),
    /// Jobs assigned to this cleaner
    Cleaner(Uuid),
    /// Unassigned open jobs scheduled on or after the given date
    Open { from: NaiveDate },
}
