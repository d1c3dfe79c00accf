//! Cleaner request domain types
//!
//! A cleaner offers to take an open job; the landlord accepts exactly one
//! offer, which declines every other pending offer on that job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::jobs::{text_enum, UnknownVariant};

/// Cleaner request status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Withdrawn,
}

text_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Accepted => "accepted",
    Declined => "declined",
    Withdrawn => "withdrawn",
});

impl RequestStatus {
    /// Counts toward the one-live-request-per-cleaner rule.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Withdrawn)
    }
}

/// An offer from a cleaner to take a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanerRequest {
    pub id: Uuid,
    pub job_id: Uuid,
    pub cleaner_id: Uuid,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl CleanerRequest {
    pub fn new(job_id: Uuid, cleaner_id: Uuid, message: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            cleaner_id,
            message,
            status: RequestStatus::Pending,
            requested_at: now,
            responded_at: None,
        }
    }
}

/// Create request input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequestInput {
    #[serde(default)]
    pub message: Option<String>,
}

/// Cleaner details shown to the landlord next to each offer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanerSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub has_hms_card: bool,
    pub completed_jobs: i64,
    pub average_rating: Option<f64>,
}

/// Request as listed for the landlord, most recent first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanerRequestView {
    #[serde(flatten)]
    pub request: CleanerRequest,
    pub cleaner: CleanerSummary,
}
