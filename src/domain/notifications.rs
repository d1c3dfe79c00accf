//! Notification domain types
//!
//! In-app notifications produced by job lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Request related
    JobRequested,
    RequestAccepted,
    RequestDeclined,

    // Job progress
    JobStarted,
    JobCompleted,
    JobCancelled,

    // Money
    PaymentCaptured,
    PayoutSent,
    PayoutDelayed,

    // System
    System,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Severity of an operator alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CaptureFailed,
    PayoutFailed,
    PayoutStuck,
    VoidFailed,
    TaskDeadLettered,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Operator alert as listed in the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct OperatorAlertResponse {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub kind: String,
    pub detail: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// In-app notification as returned to its recipient
#[derive(Debug, Clone, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
