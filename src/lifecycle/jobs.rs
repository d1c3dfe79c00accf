//! Job booking and progress transitions

use serde::Serialize;
use uuid::Uuid;

use super::{JobLifecycle, LifecycleError, LifecycleResult, PayoutOutcome};
use crate::domain::notifications::NotificationType;
use crate::domain::pricing::quote;
use crate::domain::{
    CompleteJobInput, CreateJobInput, Job, JobScope, JobStatus, Money, PriceBreakdown,
    PricingInput, Schedule, UpdateJobInput,
};
use crate::services::task_queue::Task;

const MAX_INSTRUCTIONS_LEN: usize = 2_000;
const MAX_FEEDBACK_LEN: usize = 2_000;

/// Result of starting a job. The job is in progress even when the capture
/// failed; `capture_error` then says why.
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub job: Job,
    pub capture_error: Option<String>,
}

/// Result of completing a job. The job is completed whatever the payout did.
#[derive(Debug, Clone, Serialize)]
pub struct CompleteOutcome {
    pub job: Job,
    pub payout: PayoutOutcome,
}

fn check_instructions(text: &Option<String>) -> LifecycleResult<()> {
    match text {
        Some(t) if t.chars().count() > MAX_INSTRUCTIONS_LEN => Err(LifecycleError::validation(
            format!("special instructions exceed {} characters", MAX_INSTRUCTIONS_LEN),
        )),
        _ => Ok(()),
    }
}

fn check_total(total: Money) -> LifecycleResult<()> {
    if total.is_zero() {
        return Err(LifecycleError::validation("total price must be greater than zero"));
    }
    Ok(())
}

impl JobLifecycle {
    // ========================================================================
    // Booking
    // ========================================================================

    /// Book a new job. Starts `pending` on all three status fields.
    pub async fn create_job(&self, landlord_id: Uuid, input: CreateJobInput) -> LifecycleResult<Job> {
        let today = self.clock.today();
        if input.scheduled_date < today {
            return Err(LifecycleError::validation("scheduled date is in the past"));
        }
        check_instructions(&input.special_instructions)?;

        let total = match input.pricing {
            PricingInput::Total { total_price } => total_price,
            PricingInput::Quote { property_size_sqm } => {
                let tiers = self.store.price_tiers().await?;
                quote(&tiers, input.service_type, property_size_sqm).ok_or_else(|| {
                    LifecycleError::validation(format!(
                        "no price listed for {} at {} sqm",
                        input.service_type, property_size_sqm
                    ))
                })?
            }
        };
        check_total(total)?;

        let job = Job::new(
            landlord_id,
            input.property_id,
            input.service_type,
            Schedule {
                date: input.scheduled_date,
                time: input.scheduled_time,
            },
            input.special_instructions,
            PriceBreakdown::from_total(total, self.config.platform_fee_bps),
            self.clock.now(),
        );

        let job = self.store.insert_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            landlord_id = %landlord_id,
            service_type = %job.service_type,
            total_price = %job.total_price,
            "Job created"
        );

        Ok(job)
    }

    /// Fetch a job the viewer may see: their own booking, their assignment,
    /// or an open job on the board.
    pub async fn get_job(&self, job_id: Uuid, viewer_id: Uuid) -> LifecycleResult<Job> {
        let job = self.load_job(job_id).await?;

        let visible = job.landlord_id == viewer_id
            || job.assigned_cleaner_id == Some(viewer_id)
            || job.is_editable();
        if !visible {
            return Err(LifecycleError::forbidden("you do not have access to this job"));
        }

        Ok(job)
    }

    pub async fn list_jobs(
        &self,
        scope: JobScope,
        limit: i64,
        offset: i64,
    ) -> LifecycleResult<(Vec<Job>, u64)> {
        Ok(self.store.list_jobs(scope, limit, offset).await?)
    }

    /// Edit a job that nobody has been bound to yet.
    pub async fn update_job(
        &self,
        job_id: Uuid,
        landlord_id: Uuid,
        input: UpdateJobInput,
    ) -> LifecycleResult<Job> {
        let mut job = self.load_job(job_id).await?;

        if job.landlord_id != landlord_id {
            return Err(LifecycleError::forbidden("only the landlord can edit this job"));
        }
        if !job.is_editable() {
            return Err(LifecycleError::invalid_state(format!(
                "job cannot be edited while {}",
                job.status
            )));
        }
        if input.is_empty() {
            return Err(LifecycleError::validation("no fields to update"));
        }
        if let Some(date) = input.scheduled_date {
            if date < self.clock.today() {
                return Err(LifecycleError::validation("scheduled date is in the past"));
            }
        }
        check_instructions(&input.special_instructions)?;
        if let Some(total) = input.total_price {
            check_total(total)?;
            if job.stripe_payment_intent_id.is_some() {
                return Err(LifecycleError::invalid_state(
                    "price cannot change once payment has been authorized",
                ));
            }
        }

        if let Some(service_type) = input.service_type {
            job.service_type = service_type;
        }
        if let Some(date) = input.scheduled_date {
            job.scheduled_date = date;
        }
        if input.scheduled_time.is_some() {
            job.scheduled_time = input.scheduled_time;
        }
        if input.special_instructions.is_some() {
            job.special_instructions = input.special_instructions;
        }
        if let Some(total) = input.total_price {
            job.set_pricing(PriceBreakdown::from_total(total, self.config.platform_fee_bps));
        }
        job.updated_at = self.clock.now();

        let job = self.store.update_job(&job).await?;
        tracing::info!(job_id = %job.id, landlord_id = %landlord_id, "Job updated");
        Ok(job)
    }

    /// Cancel an unassigned job and decline its pending requests. Any
    /// authorization hold is released after the cancellation commits.
    pub async fn cancel_job(&self, job_id: Uuid, landlord_id: Uuid) -> LifecycleResult<Job> {
        let mut job = self.load_job(job_id).await?;

        if job.landlord_id != landlord_id {
            return Err(LifecycleError::forbidden("only the landlord can cancel this job"));
        }
        if job.assigned_cleaner_id.is_some()
            || !job.status.can_transition_to(JobStatus::Cancelled)
        {
            return Err(LifecycleError::invalid_state(format!(
                "job cannot be cancelled while {}",
                job.status
            )));
        }

        let from = job.status;
        let now = self.clock.now();
        job.status = JobStatus::Cancelled;
        job.cancelled_at = Some(now);
        job.updated_at = now;

        let cancellation = self.store.cancel_job(&job, now).await?;

        tracing::info!(
            job_id = %job_id,
            landlord_id = %landlord_id,
            from = %from,
            to = %JobStatus::Cancelled,
            declined = cancellation.declined.len(),
            "Job cancelled"
        );

        for request in &cancellation.declined {
            self.enqueue(Task::notify(
                request.cleaner_id,
                NotificationType::JobCancelled,
                "A job you requested was cancelled",
                None,
                serde_json::json!({ "job_id": job_id, "request_id": request.id }),
            ))
            .await;
        }

        Ok(self.release_hold(cancellation.job).await)
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Move a confirmed job to in-progress on its scheduled day.
    pub async fn start_job(&self, job_id: Uuid, cleaner_id: Uuid) -> LifecycleResult<Job> {
        let mut job = self.load_job(job_id).await?;

        if !job.status.can_transition_to(JobStatus::InProgress) {
            return Err(LifecycleError::invalid_state(format!(
                "only confirmed jobs can be started, job is {}",
                job.status
            )));
        }
        if job.assigned_cleaner_id != Some(cleaner_id) {
            return Err(LifecycleError::NotAssigned);
        }
        let today = self.clock.today();
        if job.scheduled_date != today {
            return Err(LifecycleError::NotScheduledToday {
                scheduled: job.scheduled_date,
                today,
            });
        }

        let now = self.clock.now();
        job.status = JobStatus::InProgress;
        job.started_at = Some(now);
        job.updated_at = now;

        let job = self.store.update_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            cleaner_id = %cleaner_id,
            from = %JobStatus::Confirmed,
            to = %job.status,
            "Job started"
        );

        self.enqueue(Task::notify(
            job.landlord_id,
            NotificationType::JobStarted,
            "Cleaning has started",
            None,
            serde_json::json!({ "job_id": job.id, "cleaner_id": cleaner_id }),
        ))
        .await;

        Ok(job)
    }

    /// Start the job, then capture the held payment. A failed capture does
    /// not undo the start.
    pub async fn start_job_and_capture_payment(
        &self,
        job_id: Uuid,
        cleaner_id: Uuid,
    ) -> LifecycleResult<StartOutcome> {
        let job = self.start_job(job_id, cleaner_id).await?;
        let (job, capture_error) = self.capture_payment(job).await;
        Ok(StartOutcome { job, capture_error })
    }

    /// Mark an in-progress job completed with optional rating and feedback.
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        cleaner_id: Uuid,
        input: CompleteJobInput,
    ) -> LifecycleResult<Job> {
        let mut job = self.load_job(job_id).await?;

        if !job.status.can_transition_to(JobStatus::Completed) {
            return Err(LifecycleError::invalid_state(format!(
                "only in-progress jobs can be completed, job is {}",
                job.status
            )));
        }
        if job.assigned_cleaner_id != Some(cleaner_id) {
            return Err(LifecycleError::NotAssigned);
        }
        if let Some(rating) = input.rating {
            if !(1..=5).contains(&rating) {
                return Err(LifecycleError::validation("rating must be between 1 and 5"));
            }
        }
        if matches!(&input.feedback, Some(f) if f.chars().count() > MAX_FEEDBACK_LEN) {
            return Err(LifecycleError::validation(format!(
                "feedback exceeds {} characters",
                MAX_FEEDBACK_LEN
            )));
        }

        let now = self.clock.now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.rating = input.rating;
        job.feedback = input.feedback;
        job.updated_at = now;

        let job = self.store.update_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            cleaner_id = %cleaner_id,
            from = %JobStatus::InProgress,
            to = %job.status,
            rating = ?job.rating,
            "Job completed"
        );

        self.enqueue(Task::notify(
            job.landlord_id,
            NotificationType::JobCompleted,
            "Cleaning completed",
            None,
            serde_json::json!({ "job_id": job.id, "cleaner_id": cleaner_id }),
        ))
        .await;

        Ok(job)
    }

    /// Complete the job, then try to pay the cleaner. The job stays
    /// completed whatever the payout outcome.
    pub async fn complete_job_and_payout(
        &self,
        job_id: Uuid,
        cleaner_id: Uuid,
        input: CompleteJobInput,
    ) -> LifecycleResult<CompleteOutcome> {
        let job = self.complete_job(job_id, cleaner_id, input).await?;
        let (job, payout) = self.attempt_payout(job).await;
        Ok(CompleteOutcome { job, payout })
    }
}
