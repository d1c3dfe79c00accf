//! Folding processor webhooks into local state
//!
//! Deliveries are at-least-once and unordered. Each event id is applied
//! once, and no event moves a status backwards.

use serde::Serialize;

use super::{JobLifecycle, LifecycleResult};
use crate::domain::notifications::NotificationType;
use crate::domain::{AccountStatus, Job, JobStatus, PaymentStatus, WebhookEnvelope, WebhookEvent};
use crate::services::task_queue::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    /// Event id was processed before
    Duplicate,
    /// Event type is not one we act on, or it changed nothing
    Ignored,
    /// No local job or account matches the event
    Unmatched,
}

impl JobLifecycle {
    pub async fn apply_webhook_event(
        &self,
        envelope: &WebhookEnvelope,
    ) -> LifecycleResult<WebhookOutcome> {
        let event = &envelope.event;

        if let WebhookEvent::Ignored { event_type } = event {
            tracing::debug!(event_id = %envelope.event_id, event_type = %event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        if !self
            .store
            .record_webhook_event(&envelope.event_id, event.name())
            .await?
        {
            tracing::debug!(event_id = %envelope.event_id, kind = event.name(), "Duplicate webhook event");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.fold_event(event).await {
            Ok(outcome) => {
                tracing::info!(
                    event_id = %envelope.event_id,
                    kind = event.name(),
                    outcome = ?outcome,
                    "Webhook event processed"
                );
                Ok(outcome)
            }
            Err(e) => {
                // let the processor's redelivery try again
                if let Err(forget) = self.store.forget_webhook_event(&envelope.event_id).await {
                    tracing::error!(event_id = %envelope.event_id, error = %forget, "Failed to forget webhook event");
                }
                Err(e)
            }
        }
    }

    async fn fold_event(&self, event: &WebhookEvent) -> LifecycleResult<WebhookOutcome> {
        match event {
            WebhookEvent::AccountUpdated { status } => self.fold_account(status).await,
            WebhookEvent::PaymentAuthorized { payment_intent_id } => {
                self.fold_payment(payment_intent_id, |job| {
                    if job.status == JobStatus::Cancelled {
                        return false;
                    }
                    move_payment(job, PaymentStatus::Authorized)
                })
                .await
            }
            WebhookEvent::PaymentSucceeded { payment_intent_id } => {
                let outcome = self
                    .fold_payment(payment_intent_id, |job| {
                        let moved = move_payment(job, PaymentStatus::Paid);
                        if moved {
                            job.capture_error = None;
                        }
                        moved
                    })
                    .await?;

                if outcome == WebhookOutcome::Applied {
                    if let Some(job) = self.store.find_job_by_payment_intent(payment_intent_id).await? {
                        self.enqueue(Task::notify(
                            job.landlord_id,
                            NotificationType::PaymentCaptured,
                            "Payment captured",
                            Some(format!("{} was charged for your cleaning", job.total_price)),
                            serde_json::json!({ "job_id": job.id }),
                        ))
                        .await;
                    }
                }
                Ok(outcome)
            }
            WebhookEvent::PaymentFailed {
                payment_intent_id,
                reason,
            } => {
                let reason = reason
                    .clone()
                    .unwrap_or_else(|| "payment failed".to_string());
                self.fold_payment(payment_intent_id, |job| {
                    if !move_payment(job, PaymentStatus::Failed) {
                        return false;
                    }
                    job.capture_error = Some(reason.clone());
                    true
                })
                .await
            }
            WebhookEvent::ChargeRefunded { payment_intent_id } => {
                self.fold_payment(payment_intent_id, |job| {
                    move_payment(job, PaymentStatus::Refunded)
                })
                .await
            }
            WebhookEvent::Ignored { .. } => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn fold_account(&self, status: &AccountStatus) -> LifecycleResult<WebhookOutcome> {
        let Some(mut account) = self.store.find_connect_account(&status.account_id).await? else {
            tracing::warn!(account_id = %status.account_id, "Webhook for unknown connect account");
            return Ok(WebhookOutcome::Unmatched);
        };

        account.apply_status(status, self.clock.now());
        self.store.upsert_connect_account(&account).await?;

        tracing::info!(
            cleaner_id = %account.cleaner_id,
            account_id = %account.account_id,
            payouts_enabled = account.payouts_enabled,
            "Connect account mirrored"
        );
        Ok(WebhookOutcome::Applied)
    }

    async fn fold_payment<F>(&self, payment_intent_id: &str, apply: F) -> LifecycleResult<WebhookOutcome>
    where
        F: FnMut(&mut Job) -> bool + Send,
    {
        let Some(job) = self.store.find_job_by_payment_intent(payment_intent_id).await? else {
            tracing::warn!(payment_intent_id = %payment_intent_id, "Webhook for unknown payment");
            return Ok(WebhookOutcome::Unmatched);
        };

        let from = job.payment_status;
        let (job, changed) = self.patch_job(job, apply).await?;
        if !changed {
            return Ok(WebhookOutcome::Ignored);
        }

        tracing::info!(
            job_id = %job.id,
            payment_intent_id = %payment_intent_id,
            from = %from,
            to = %job.payment_status,
            "Payment status folded from webhook"
        );
        Ok(WebhookOutcome::Applied)
    }
}

fn move_payment(job: &mut Job, to: PaymentStatus) -> bool {
    if !job.payment_status.can_transition_to(to) {
        return false;
    }
    job.payment_status = to;
    true
}
