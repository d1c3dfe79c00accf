//! Cleaner requests on open jobs
//!
//! Many cleaners may offer to take a job; the landlord picks one. Accepting
//! binds the cleaner and declines every other pending request in the same
//! store operation.

use uuid::Uuid;

use super::{JobLifecycle, LifecycleError, LifecycleResult};
use crate::domain::notifications::NotificationType;
use crate::domain::{
    CleanerRequest, CleanerRequestView, CreateRequestInput, JobStatus, RequestStatus,
};
use crate::services::task_queue::Task;
use crate::store::{Acceptance, StoreError};

const MAX_MESSAGE_LEN: usize = 1_000;
const CREATE_ATTEMPTS: usize = 3;

impl JobLifecycle {
    /// Offer to take an open job. The first request moves the job from
    /// `pending` to `requested`.
    pub async fn request_job(
        &self,
        job_id: Uuid,
        cleaner_id: Uuid,
        input: CreateRequestInput,
    ) -> LifecycleResult<CleanerRequest> {
        if matches!(&input.message, Some(m) if m.chars().count() > MAX_MESSAGE_LEN) {
            return Err(LifecycleError::validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        for _ in 0..CREATE_ATTEMPTS {
            let mut job = self.load_job(job_id).await?;

            if job.landlord_id == cleaner_id {
                return Err(LifecycleError::forbidden("you cannot request your own job"));
            }
            if !job.is_editable() {
                return Err(LifecycleError::invalid_state(format!(
                    "job is {} and no longer takes requests",
                    job.status
                )));
            }

            let now = self.clock.now();
            let request = CleanerRequest::new(job_id, cleaner_id, input.message.clone(), now);
            let from = job.status;
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Requested;
            }
            job.updated_at = now;

            match self.store.create_request(&request, &job).await {
                Ok(job) => {
                    tracing::info!(
                        job_id = %job_id,
                        cleaner_id = %cleaner_id,
                        request_id = %request.id,
                        from = %from,
                        to = %job.status,
                        "Job requested"
                    );

                    self.enqueue(Task::notify(
                        job.landlord_id,
                        NotificationType::JobRequested,
                        "A cleaner wants your job",
                        request.message.clone(),
                        serde_json::json!({
                            "job_id": job_id,
                            "request_id": request.id,
                            "cleaner_id": cleaner_id,
                        }),
                    ))
                    .await;

                    return Ok(request);
                }
                Err(StoreError::Conflict) => {
                    tracing::debug!(job_id = %job_id, "Job changed while requesting, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LifecycleError::invalid_state(
            "job is being modified concurrently, try again",
        ))
    }

    /// Requests on a job with cleaner details, newest first. Landlord only.
    pub async fn list_requests_for_job(
        &self,
        job_id: Uuid,
        landlord_id: Uuid,
    ) -> LifecycleResult<Vec<CleanerRequestView>> {
        let job = self.load_job(job_id).await?;
        if job.landlord_id != landlord_id {
            return Err(LifecycleError::forbidden(
                "only the landlord can see requests for this job",
            ));
        }
        Ok(self.store.list_requests(job_id).await?)
    }

    /// Bind the requesting cleaner to the job. Of two concurrent
    /// acceptances on one job only the first commits.
    pub async fn accept_request(
        &self,
        job_id: Uuid,
        request_id: Uuid,
        landlord_id: Uuid,
    ) -> LifecycleResult<Acceptance> {
        let mut job = self.load_job(job_id).await?;
        if job.landlord_id != landlord_id {
            return Err(LifecycleError::forbidden(
                "only the landlord can accept requests for this job",
            ));
        }

        let request = self
            .store
            .get_request(request_id)
            .await?
            .filter(|r| r.job_id == job_id)
            .ok_or(LifecycleError::NotFound("request"))?;

        if request.status != RequestStatus::Pending {
            return Err(LifecycleError::invalid_state(format!(
                "request is already {}",
                request.status
            )));
        }
        if job.assigned_cleaner_id.is_some()
            || !job.status.can_transition_to(JobStatus::Confirmed)
        {
            return Err(LifecycleError::invalid_state(format!(
                "job is {} and can no longer be assigned",
                job.status
            )));
        }

        let from = job.status;
        let now = self.clock.now();
        job.status = JobStatus::Confirmed;
        job.assigned_cleaner_id = Some(request.cleaner_id);
        job.updated_at = now;

        let acceptance = self.store.accept_request(&job, request_id, now).await?;

        tracing::info!(
            job_id = %job_id,
            landlord_id = %landlord_id,
            cleaner_id = %request.cleaner_id,
            from = %from,
            to = %acceptance.job.status,
            declined = acceptance.declined.len(),
            "Request accepted"
        );

        self.enqueue(Task::notify(
            request.cleaner_id,
            NotificationType::RequestAccepted,
            "Your request was accepted",
            None,
            serde_json::json!({ "job_id": job_id, "request_id": request_id }),
        ))
        .await;
        for declined in &acceptance.declined {
            self.enqueue(Task::notify(
                declined.cleaner_id,
                NotificationType::RequestDeclined,
                "Another cleaner was chosen",
                None,
                serde_json::json!({ "job_id": job_id, "request_id": declined.id }),
            ))
            .await;
        }

        Ok(acceptance)
    }

    /// Take back a pending request. The job keeps its status.
    pub async fn withdraw_request(
        &self,
        request_id: Uuid,
        cleaner_id: Uuid,
    ) -> LifecycleResult<CleanerRequest> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(LifecycleError::NotFound("request"))?;

        if request.cleaner_id != cleaner_id {
            return Err(LifecycleError::forbidden("you can only withdraw your own requests"));
        }
        if request.status != RequestStatus::Pending {
            return Err(LifecycleError::invalid_state(format!(
                "request is already {}",
                request.status
            )));
        }

        let request = self
            .store
            .withdraw_request(request_id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    LifecycleError::invalid_state("request is no longer pending")
                }
                other => other.into(),
            })?;

        tracing::info!(
            job_id = %request.job_id,
            cleaner_id = %cleaner_id,
            request_id = %request_id,
            "Request withdrawn"
        );

        Ok(request)
    }
}
