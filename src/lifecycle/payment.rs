//! Landlord charge: authorization, capture and release

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::{JobLifecycle, LifecycleError, LifecycleResult};
use crate::domain::notifications::{AlertKind, NotificationType};
use crate::domain::{Job, JobStatus, PaymentStatus};
use crate::gateway::{AuthorizeCharge, IntentStatus};
use crate::services::task_queue::Task;

/// Capture key for a job on a given business day. Retries on the same day
/// reuse it, so the processor never charges twice.
pub fn capture_idempotency_key(job_id: Uuid, date: NaiveDate) -> String {
    format!("capture-{}-{}", job_id, date.format("%Y-%m-%d"))
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentAuthorization {
    pub job: Job,
    /// Handed to the landlord's browser to confirm the hold
    pub client_secret: Option<String>,
}

impl JobLifecycle {
    /// Place a manual-capture hold for the job's total price.
    pub async fn authorize_job_payment(
        &self,
        job_id: Uuid,
        landlord_id: Uuid,
    ) -> LifecycleResult<PaymentAuthorization> {
        let job = self.load_job(job_id).await?;

        if job.landlord_id != landlord_id {
            return Err(LifecycleError::forbidden("only the landlord can pay for this job"));
        }
        if job.status.is_terminal() {
            return Err(LifecycleError::invalid_state(format!(
                "cannot authorize payment for a {} job",
                job.status
            )));
        }
        if job.payment_status != PaymentStatus::Pending {
            return Err(LifecycleError::invalid_state(format!(
                "payment is already {}",
                job.payment_status
            )));
        }

        let authorization = self
            .gateway
            .authorize_charge(&AuthorizeCharge {
                job_id: job.id,
                landlord_id,
                amount: job.total_price,
                currency: self.config.currency.clone(),
                idempotency_key: format!("authorize-{}-{}", job.id, job.total_price.minor()),
            })
            .await?;

        let intent_id = authorization.payment_intent_id.clone();
        let held = authorization.status == IntentStatus::RequiresCapture;

        let (job, _) = self
            .patch_job(job, |job| {
                job.stripe_payment_intent_id = Some(intent_id.clone());
                if held && job.payment_status.can_transition_to(PaymentStatus::Authorized) {
                    job.payment_status = PaymentStatus::Authorized;
                }
                true
            })
            .await?;

        tracing::info!(
            job_id = %job.id,
            payment_intent_id = %authorization.payment_intent_id,
            payment_status = %job.payment_status,
            "Payment authorization created"
        );

        Ok(PaymentAuthorization {
            job,
            client_secret: authorization.client_secret,
        })
    }

    /// Operator path: capture again after a failed attempt.
    pub async fn retry_capture(&self, job_id: Uuid) -> LifecycleResult<(Job, Option<String>)> {
        let job = self.load_job(job_id).await?;

        if job.status != JobStatus::InProgress {
            return Err(LifecycleError::invalid_state(format!(
                "capture is only attempted on in-progress jobs, job is {}",
                job.status
            )));
        }
        if !matches!(
            job.payment_status,
            PaymentStatus::Pending | PaymentStatus::Authorized | PaymentStatus::Failed
        ) {
            return Err(LifecycleError::invalid_state(format!(
                "payment is already {}",
                job.payment_status
            )));
        }

        tracing::info!(job_id = %job.id, "Retrying payment capture");
        Ok(self.capture_payment(job).await)
    }

    /// Capture the held charge for an in-progress job. Never fails: problems
    /// are recorded on the job and returned as the second element.
    pub(super) async fn capture_payment(&self, job: Job) -> (Job, Option<String>) {
        if job.payment_status == PaymentStatus::Paid {
            return (job, None);
        }

        let Some(intent_id) = job.stripe_payment_intent_id.clone() else {
            return self
                .record_capture_failure(job, "payment has not been authorized".to_string(), false)
                .await;
        };

        // The hold can exist before its webhook has been folded in
        if job.payment_status == PaymentStatus::Pending {
            match self.gateway.payment_intent_status(&intent_id).await {
                Ok(IntentStatus::RequiresCapture) => {}
                Ok(IntentStatus::Succeeded) => return self.record_capture_success(job).await,
                Ok(other) => {
                    let reason = format!("payment is not authorized yet ({:?})", other);
                    return self.record_capture_failure(job, reason, false).await;
                }
                Err(e) => {
                    return self
                        .record_capture_failure(job, e.message().to_string(), false)
                        .await
                }
            }
        }

        let key = capture_idempotency_key(job.id, self.clock.today());
        tracing::debug!(job_id = %job.id, idempotency_key = %key, "Capturing payment");

        match self.gateway.capture_authorized_charge(&intent_id, &key).await {
            Ok(()) => self.record_capture_success(job).await,
            Err(e) => {
                let fatal = !e.is_transient();
                self.record_capture_failure(job, e.message().to_string(), fatal)
                    .await
            }
        }
    }

    async fn record_capture_success(&self, job: Job) -> (Job, Option<String>) {
        let fallback = job.clone();
        let result = self
            .patch_job(job, |job| {
                let mut changed = job.capture_error.take().is_some();
                if job.payment_status.can_transition_to(PaymentStatus::Paid) {
                    job.payment_status = PaymentStatus::Paid;
                    changed = true;
                }
                changed
            })
            .await;

        match result {
            Ok((job, _)) => {
                tracing::info!(
                    job_id = %job.id,
                    payment_status = %job.payment_status,
                    "Payment captured"
                );
                self.enqueue(Task::notify(
                    job.landlord_id,
                    NotificationType::PaymentCaptured,
                    "Payment captured",
                    Some(format!("{} was charged for your cleaning", job.total_price)),
                    serde_json::json!({ "job_id": job.id }),
                ))
                .await;
                (job, None)
            }
            Err(e) => {
                // Charge went through; the webhook will still mark it paid
                tracing::error!(job_id = %fallback.id, error = %e, "Failed to record captured payment");
                (fallback, None)
            }
        }
    }

    async fn record_capture_failure(
        &self,
        job: Job,
        reason: String,
        fatal: bool,
    ) -> (Job, Option<String>) {
        tracing::warn!(job_id = %job.id, reason = %reason, fatal = fatal, "Payment capture failed");

        let fallback = job.clone();
        let recorded = reason.clone();
        let result = self
            .patch_job(job, |job| {
                job.capture_error = Some(recorded.clone());
                if fatal && job.payment_status.can_transition_to(PaymentStatus::Failed) {
                    job.payment_status = PaymentStatus::Failed;
                }
                true
            })
            .await;

        let job = match result {
            Ok((job, _)) => job,
            Err(e) => {
                tracing::error!(job_id = %fallback.id, error = %e, "Failed to record capture error");
                fallback
            }
        };

        self.enqueue(Task::alert(
            Some(job.id),
            AlertKind::CaptureFailed,
            format!("capture for job {} failed: {}", job.id, reason),
        ))
        .await;

        (job, Some(reason))
    }

    /// Release an authorization hold on a cancelled job. Failures leave the
    /// job as it is and raise an alert.
    pub(super) async fn release_hold(&self, job: Job) -> Job {
        let Some(intent_id) = job.stripe_payment_intent_id.clone() else {
            return job;
        };
        if !matches!(
            job.payment_status,
            PaymentStatus::Pending | PaymentStatus::Authorized
        ) {
            return job;
        }

        let key = format!("void-{}", job.id);
        match self.gateway.cancel_authorization(&intent_id, &key).await {
            Ok(()) => {
                let fallback = job.clone();
                let result = self
                    .patch_job(job, |job| {
                        if job.payment_status.can_transition_to(PaymentStatus::Voided) {
                            job.payment_status = PaymentStatus::Voided;
                            true
                        } else {
                            false
                        }
                    })
                    .await;

                match result {
                    Ok((job, _)) => {
                        tracing::info!(job_id = %job.id, payment_status = %job.payment_status, "Payment hold released");
                        job
                    }
                    Err(e) => {
                        tracing::error!(job_id = %fallback.id, error = %e, "Failed to record released hold");
                        fallback
                    }
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to release payment hold");
                self.enqueue(Task::alert(
                    Some(job.id),
                    AlertKind::VoidFailed,
                    format!("releasing hold {} failed: {}", intent_id, e),
                ))
                .await;
                job
            }
        }
    }
}
