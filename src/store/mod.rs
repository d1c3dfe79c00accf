//! Job record store
//!
//! Durable home of jobs, cleaner requests and connect accounts. Every job
//! write is a compare-and-set on the job's `version`; operations that touch
//! several rows commit as one unit or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::{PriceTier, DEFAULT_PRICE_TABLE};
use crate::domain::{CleanerRequest, CleanerRequestView, ConnectAccount, Job, JobScope};

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The row changed between read and write
    #[error("record was modified concurrently")]
    Conflict,

    /// A uniqueness rule rejected the write
    #[error("duplicate record")]
    Duplicate,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of accepting one request on a job
#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub job: Job,
    pub accepted: CleanerRequest,
    pub declined: Vec<CleanerRequest>,
}

/// Result of cancelling a job
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub job: Job,
    pub declined: Vec<CleanerRequest>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Insert a new job; the stored copy is returned with its version.
    async fn insert_job(&self, job: &Job) -> StoreResult<Job>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Page through jobs in a scope. Returns the page and the total count.
    async fn list_jobs(&self, scope: JobScope, limit: i64, offset: i64)
        -> StoreResult<(Vec<Job>, u64)>;

    /// Persist `job` if the stored version still equals `job.version`.
    async fn update_job(&self, job: &Job) -> StoreResult<Job>;

    /// Completed, paid jobs whose payout is pending and due at `now`,
    /// oldest completion first.
    async fn jobs_awaiting_payout(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Job>>;

    async fn find_job_by_payment_intent(&self, payment_intent_id: &str)
        -> StoreResult<Option<Job>>;

    // ------------------------------------------------------------------
    // Cleaner requests
    // ------------------------------------------------------------------

    /// Insert a request and persist `job` alongside it. The job write is
    /// version checked, so a request never lands on a job that was accepted
    /// or cancelled in the meantime. Fails with `Duplicate` if the cleaner
    /// already has a live request on the job.
    async fn create_request(&self, request: &CleanerRequest, job: &Job) -> StoreResult<Job>;

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<CleanerRequest>>;

    /// Requests on a job joined with cleaner details, newest first.
    async fn list_requests(&self, job_id: Uuid) -> StoreResult<Vec<CleanerRequestView>>;

    /// Persist the confirmed `job`, mark `request_id` accepted and every
    /// other pending request on the job declined, atomically.
    async fn accept_request(
        &self,
        job: &Job,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Acceptance>;

    /// Move a pending request to withdrawn. `Conflict` if it is no longer
    /// pending.
    async fn withdraw_request(&self, request_id: Uuid, now: DateTime<Utc>)
        -> StoreResult<CleanerRequest>;

    /// Persist the cancelled `job` and decline its pending requests,
    /// atomically.
    async fn cancel_job(&self, job: &Job, now: DateTime<Utc>) -> StoreResult<Cancellation>;

    // ------------------------------------------------------------------
    // Connect accounts
    // ------------------------------------------------------------------

    async fn get_connect_account(&self, cleaner_id: Uuid) -> StoreResult<Option<ConnectAccount>>;

    async fn find_connect_account(&self, account_id: &str) -> StoreResult<Option<ConnectAccount>>;

    async fn upsert_connect_account(&self, account: &ConnectAccount) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Webhooks and reference data
    // ------------------------------------------------------------------

    /// Remember a processed webhook event. Returns `false` if it was seen
    /// before.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> StoreResult<bool>;

    /// Drop a recorded event so a redelivery is processed again.
    async fn forget_webhook_event(&self, event_id: &str) -> StoreResult<()>;

    async fn price_tiers(&self) -> StoreResult<Vec<PriceTier>>;

    /// Insert or replace tiers keyed by (service type, lower bound).
    async fn upsert_price_tiers(&self, tiers: &[PriceTier]) -> StoreResult<()>;
}

/// Seed the default price table. Idempotent.
pub async fn seed_price_table(store: &dyn JobStore) -> StoreResult<()> {
    store.upsert_price_tiers(DEFAULT_PRICE_TABLE).await?;
    tracing::info!(tiers = DEFAULT_PRICE_TABLE.len(), "Price table seeded");
    Ok(())
}
