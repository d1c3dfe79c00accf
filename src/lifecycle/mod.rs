//! Job lifecycle orchestrator
//!
//! Owns every transition of a job's three status fields and sequences them
//! against the payment gateway. Rule violations reject an operation before
//! anything is written. Gateway failures after a committed write are
//! recorded on the job and reported as a degraded outcome, never rolled
//! back.

pub mod clock;
mod accounts;
mod error;
mod jobs;
mod payment;
mod payout;
mod requests;
mod webhooks;

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Job;
use crate::gateway::PaymentGateway;
use crate::services::task_queue::{Task, TaskQueue};
use crate::store::{JobStore, StoreError};

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LifecycleError, LifecycleResult};
pub use jobs::{CompleteOutcome, StartOutcome};
pub use payment::{capture_idempotency_key, PaymentAuthorization};
pub use payout::{payout_idempotency_key, payout_retry_delay, PayoutOutcome, PAYOUT_STUCK_AFTER};
pub use webhooks::WebhookOutcome;

/// Attempts at a read-modify-write before giving up on a busy job
const PATCH_ATTEMPTS: usize = 3;

/// Business settings the lifecycle needs at runtime
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub platform_fee_bps: u32,
    /// ISO 4217 code sent to the processor
    pub currency: String,
    pub connect_return_url: String,
    pub connect_refresh_url: String,
}

pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    gateway: Arc<dyn PaymentGateway>,
    tasks: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl JobLifecycle {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn PaymentGateway>,
        tasks: Arc<dyn TaskQueue>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            tasks,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn load_job(&self, job_id: Uuid) -> LifecycleResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(LifecycleError::NotFound("job"))
    }

    /// Hand a side effect to the task queue. Failures are logged and dropped.
    async fn enqueue(&self, task: Task) {
        if let Err(e) = self.tasks.enqueue(task).await {
            tracing::warn!(error = %e, "Failed to enqueue background task");
        }
    }

    /// Read-modify-write against the latest stored copy of `job`.
    ///
    /// `apply` returns false when there is nothing to change. On a version
    /// conflict the job is reloaded and `apply` runs again.
    async fn patch_job<F>(&self, mut job: Job, mut apply: F) -> LifecycleResult<(Job, bool)>
    where
        F: FnMut(&mut Job) -> bool + Send,
    {
        for _ in 0..PATCH_ATTEMPTS {
            let mut next = job.clone();
            if !apply(&mut next) {
                return Ok((job, false));
            }
            next.updated_at = self.clock.now();

            match self.store.update_job(&next).await {
                Ok(stored) => return Ok((stored, true)),
                Err(StoreError::Conflict) => {
                    tracing::debug!(job_id = %job.id, "Job changed underneath patch, reloading");
                    job = self.load_job(job.id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LifecycleError::invalid_state(
            "job is being modified concurrently, try again",
        ))
    }
}
