//! Cleaner payouts
//!
//! A payout is only attempted for a completed job whose charge is paid.
//! Unsettled funds leave it pending with a backoff; any other processor
//! failure marks it failed and raises an operator alert.

use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{JobLifecycle, LifecycleError, LifecycleResult};
use crate::domain::notifications::{AlertKind, NotificationType};
use crate::domain::{Job, JobStatus, PaymentStatus, PayoutStatus};
use crate::gateway::TransferRequest;
use crate::services::task_queue::Task;

/// Transient attempts after which an operator is told about the job.
pub const PAYOUT_STUCK_AFTER: i32 = 10;

const RETRY_BASE_HOURS: i64 = 12;
const RETRY_CAP_DAYS: i64 = 7;

/// Wait before the next attempt after `attempts` transient failures:
/// 12h doubling per attempt, capped at seven days.
pub fn payout_retry_delay(attempts: i32) -> Duration {
    let exponent = (attempts.max(1) - 1).min(16) as u32;
    let hours = RETRY_BASE_HOURS.saturating_mul(1_i64 << exponent);
    Duration::hours(hours).min(Duration::days(RETRY_CAP_DAYS))
}

/// Transfer key for one recorded attempt. A lost response retried under
/// the same attempt count is deduplicated by the processor.
pub fn payout_idempotency_key(job_id: Uuid, attempts: i32) -> String {
    format!("payout-{}-{}", job_id, attempts)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutOutcome {
    /// `transfer_id` is absent when there was nothing to transfer
    Paid { transfer_id: Option<String> },
    /// Expected delay; retried by the sweep
    Pending { reason: String },
    /// Needs an operator
    Failed { reason: String },
}

impl JobLifecycle {
    /// Try to pay out one job. Never fails: the outcome is recorded on the
    /// job and returned.
    pub async fn attempt_payout(&self, job: Job) -> (Job, PayoutOutcome) {
        match job.payout_status {
            PayoutStatus::Paid => {
                let transfer_id = job.stripe_transfer_id.clone();
                return (job, PayoutOutcome::Paid { transfer_id });
            }
            PayoutStatus::Failed => {
                let reason = job.payout_error.clone().unwrap_or_default();
                return (job, PayoutOutcome::Failed { reason });
            }
            PayoutStatus::Pending => {}
        }

        if job.status != JobStatus::Completed {
            let reason = format!("job is {}, not completed", job.status);
            return (job, PayoutOutcome::Pending { reason });
        }
        if job.payment_status != PaymentStatus::Paid {
            return self
                .defer_payout(job, "payment has not been captured yet".to_string())
                .await;
        }

        let Some(cleaner_id) = job.assigned_cleaner_id else {
            return self
                .fail_payout(job, "completed job has no assigned cleaner".to_string())
                .await;
        };

        let account = match self.store.get_connect_account(cleaner_id).await {
            Ok(account) => account,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to load payout account");
                let reason = "payout account could not be loaded".to_string();
                return (job, PayoutOutcome::Pending { reason });
            }
        };
        let Some(account) = account else {
            return self
                .defer_payout(job, "cleaner has not set up a payout account".to_string())
                .await;
        };
        if let Some(blocker) = account.payout_blocker() {
            return self.defer_payout(job, blocker).await;
        }

        if job.cleaner_payout.is_zero() {
            return self.record_payout(job, None).await;
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("job_id".to_string(), job.id.to_string());
        metadata.insert("cleaner_id".to_string(), cleaner_id.to_string());

        let request = TransferRequest {
            destination_account_id: account.account_id.clone(),
            amount: job.cleaner_payout,
            currency: self.config.currency.clone(),
            idempotency_key: payout_idempotency_key(job.id, job.payout_attempts),
            metadata,
        };

        tracing::debug!(
            job_id = %job.id,
            destination = %request.destination_account_id,
            amount = %request.amount,
            idempotency_key = %request.idempotency_key,
            "Transferring payout"
        );

        match self.gateway.transfer_payout(&request).await {
            Ok(transfer) => self.record_payout(job, Some(transfer.transfer_id)).await,
            Err(e) if e.is_transient() => self.delay_payout(job, e.message().to_string()).await,
            Err(e) => self.fail_payout(job, e.message().to_string()).await,
        }
    }

    /// Operator path: put a failed payout back to pending and try it now.
    pub async fn retry_payout(&self, job_id: Uuid) -> LifecycleResult<(Job, PayoutOutcome)> {
        let job = self.load_job(job_id).await?;

        if job.status != JobStatus::Completed || job.payment_status != PaymentStatus::Paid {
            return Err(LifecycleError::invalid_state(
                "payouts need a completed job with a paid charge",
            ));
        }
        if job.payout_status == PayoutStatus::Paid {
            return Err(LifecycleError::invalid_state("payout has already been sent"));
        }

        let (job, _) = self
            .patch_job(job, |job| {
                if job.payout_status != PayoutStatus::Failed && job.next_payout_attempt_at.is_none() {
                    return false;
                }
                job.payout_status = PayoutStatus::Pending;
                job.payout_error = None;
                job.next_payout_attempt_at = None;
                true
            })
            .await?;

        tracing::info!(job_id = %job.id, attempts = job.payout_attempts, "Retrying payout");
        Ok(self.attempt_payout(job).await)
    }

    async fn record_payout(&self, job: Job, transfer_id: Option<String>) -> (Job, PayoutOutcome) {
        let now = self.clock.now();
        let fallback = job.clone();
        let recorded = transfer_id.clone();

        let result = self
            .patch_job(job, |job| {
                job.payout_status = PayoutStatus::Paid;
                job.stripe_transfer_id = recorded.clone();
                job.payout_date = Some(now);
                job.payout_pending_reason = None;
                job.payout_error = None;
                job.next_payout_attempt_at = None;
                true
            })
            .await;

        let job = match result {
            Ok((job, _)) => job,
            Err(e) => {
                // Retrying reuses the same transfer key, so this is recoverable
                tracing::error!(job_id = %fallback.id, transfer_id = ?transfer_id, error = %e, "Failed to record payout");
                return (fallback, PayoutOutcome::Paid { transfer_id });
            }
        };

        tracing::info!(
            job_id = %job.id,
            transfer_id = ?transfer_id,
            amount = %job.cleaner_payout,
            "Payout sent"
        );

        if let Some(cleaner_id) = job.assigned_cleaner_id {
            self.enqueue(Task::notify(
                cleaner_id,
                NotificationType::PayoutSent,
                "Payout sent",
                Some(format!("{} is on its way to your account", job.cleaner_payout)),
                serde_json::json!({ "job_id": job.id, "transfer_id": transfer_id }),
            ))
            .await;
        }

        (job, PayoutOutcome::Paid { transfer_id })
    }

    /// Waiting on something outside the processor (account setup, capture).
    async fn defer_payout(&self, job: Job, reason: String) -> (Job, PayoutOutcome) {
        let fallback = job.clone();
        let recorded = reason.clone();

        let job = match self
            .patch_job(job, |job| {
                if job.payout_pending_reason.as_deref() == Some(recorded.as_str()) {
                    return false;
                }
                job.payout_pending_reason = Some(recorded.clone());
                true
            })
            .await
        {
            Ok((job, _)) => job,
            Err(e) => {
                tracing::error!(job_id = %fallback.id, error = %e, "Failed to record payout deferral");
                fallback
            }
        };

        tracing::info!(job_id = %job.id, reason = %reason, "Payout deferred");
        (job, PayoutOutcome::Pending { reason })
    }

    /// Processor reported unsettled funds: back off and try again later.
    async fn delay_payout(&self, job: Job, reason: String) -> (Job, PayoutOutcome) {
        let now = self.clock.now();
        let fallback = job.clone();
        let recorded = reason.clone();

        let result = self
            .patch_job(job, |job| {
                job.payout_attempts += 1;
                job.payout_pending_reason = Some(recorded.clone());
                job.next_payout_attempt_at = Some(now + payout_retry_delay(job.payout_attempts));
                true
            })
            .await;

        let job = match result {
            Ok((job, _)) => job,
            Err(e) => {
                tracing::error!(job_id = %fallback.id, error = %e, "Failed to record payout delay");
                return (fallback, PayoutOutcome::Pending { reason });
            }
        };

        tracing::warn!(
            job_id = %job.id,
            attempts = job.payout_attempts,
            next_attempt_at = ?job.next_payout_attempt_at,
            reason = %reason,
            "Payout pending on settlement"
        );

        if job.payout_attempts == 1 {
            if let Some(cleaner_id) = job.assigned_cleaner_id {
                self.enqueue(Task::notify(
                    cleaner_id,
                    NotificationType::PayoutDelayed,
                    "Payout delayed",
                    Some("Funds are still settling. We will retry automatically.".to_string()),
                    serde_json::json!({ "job_id": job.id }),
                ))
                .await;
            }
        }
        if job.payout_attempts == PAYOUT_STUCK_AFTER {
            self.enqueue(Task::alert(
                Some(job.id),
                AlertKind::PayoutStuck,
                format!(
                    "payout for job {} still pending after {} attempts: {}",
                    job.id, job.payout_attempts, reason
                ),
            ))
            .await;
        }

        (job, PayoutOutcome::Pending { reason })
    }

    async fn fail_payout(&self, job: Job, reason: String) -> (Job, PayoutOutcome) {
        let fallback = job.clone();
        let recorded = reason.clone();

        let result = self
            .patch_job(job, |job| {
                job.payout_status = PayoutStatus::Failed;
                job.payout_error = Some(recorded.clone());
                job.payout_pending_reason = None;
                job.next_payout_attempt_at = None;
                // fresh transfer key for an operator retry
                job.payout_attempts += 1;
                true
            })
            .await;

        let job = match result {
            Ok((job, _)) => job,
            Err(e) => {
                tracing::error!(job_id = %fallback.id, error = %e, "Failed to record payout failure");
                fallback
            }
        };

        tracing::error!(job_id = %job.id, reason = %reason, "Payout failed");

        self.enqueue(Task::alert(
            Some(job.id),
            AlertKind::PayoutFailed,
            format!("payout for job {} failed: {}", job.id, reason),
        ))
        .await;

        (job, PayoutOutcome::Failed { reason })
    }
}
