//! In-process job store
//!
//! Backs the test suite and local experiments. A single lock guards all
//! tables, so every trait method is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::{Acceptance, Cancellation, JobStore, StoreError, StoreResult};
use crate::domain::pricing::PriceTier;
use crate::domain::{
    CleanerRequest, CleanerRequestView, CleanerSummary, ConnectAccount, Job, JobScope, JobStatus,
    RequestStatus,
};

/// Display details for a cleaner, normally joined from profiles
#[derive(Debug, Clone, Default)]
pub struct CleanerProfile {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub has_hms_card: bool,
}

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    requests: HashMap<Uuid, CleanerRequest>,
    accounts: HashMap<Uuid, ConnectAccount>,
    profiles: HashMap<Uuid, CleanerProfile>,
    webhook_events: HashSet<String>,
    price_tiers: Vec<PriceTier>,
}

impl Tables {
    fn check_version(&self, job: &Job) -> StoreResult<()> {
        let stored = self.jobs.get(&job.id).ok_or(StoreError::NotFound("job"))?;
        if stored.version != job.version {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    fn write_job(&mut self, job: &Job) -> Job {
        let mut stored = job.clone();
        stored.version += 1;
        self.jobs.insert(stored.id, stored.clone());
        stored
    }

    fn decline_pending(
        &mut self,
        job_id: Uuid,
        except: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Vec<CleanerRequest> {
        let mut declined: Vec<CleanerRequest> = self
            .requests
            .values_mut()
            .filter(|r| {
                r.job_id == job_id && r.status == RequestStatus::Pending && Some(r.id) != except
            })
            .map(|r| {
                r.status = RequestStatus::Declined;
                r.responded_at = Some(now);
                r.clone()
            })
            .collect();
        declined.sort_by_key(|r| r.requested_at);
        declined
    }

    fn summary(&self, cleaner_id: Uuid) -> CleanerSummary {
        let profile = self.profiles.get(&cleaner_id).cloned().unwrap_or_default();
        let completed: Vec<&Job> = self
            .jobs
            .values()
            .filter(|j| j.assigned_cleaner_id == Some(cleaner_id) && j.status == JobStatus::Completed)
            .collect();
        let ratings: Vec<f64> = completed
            .iter()
            .filter_map(|j| j.rating.map(f64::from))
            .collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        CleanerSummary {
            id: cleaner_id,
            full_name: profile.full_name,
            email: profile.email,
            company_name: profile.company_name,
            has_hms_card: profile.has_hms_card,
            completed_jobs: completed.len() as i64,
            average_rating,
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, cleaner_id: Uuid, profile: CleanerProfile) {
        self.tables.lock().profiles.insert(cleaner_id, profile);
    }

    /// Every request on a job, in insertion-independent order.
    pub fn requests_for(&self, job_id: Uuid) -> Vec<CleanerRequest> {
        let tables = self.tables.lock();
        let mut requests: Vec<CleanerRequest> = tables
            .requests
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }

    pub fn job_count(&self) -> usize {
        self.tables.lock().jobs.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<Job> {
        let mut tables = self.tables.lock();
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate);
        }
        let mut stored = job.clone();
        stored.version = 1;
        tables.jobs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.tables.lock().jobs.get(&id).cloned())
    }

    async fn list_jobs(
        &self,
        scope: JobScope,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Job>, u64)> {
        let tables = self.tables.lock();
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| match scope {
                JobScope::Landlord(id) => j.landlord_id == id,
                JobScope::Cleaner(id) => j.assigned_cleaner_id == Some(id),
                JobScope::Open { from } => {
                    j.status.is_open() && j.assigned_cleaner_id.is_none() && j.scheduled_date >= from
                }
            })
            .cloned()
            .collect();

        match scope {
            JobScope::Landlord(_) => jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            JobScope::Cleaner(_) => jobs.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date)),
            JobScope::Open { .. } => jobs.sort_by_key(|j| (j.scheduled_date, j.created_at)),
        }

        let total = jobs.len() as u64;
        let page = jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_job(&self, job: &Job) -> StoreResult<Job> {
        let mut tables = self.tables.lock();
        tables.check_version(job)?;
        Ok(tables.write_job(job))
    }

    async fn jobs_awaiting_payout(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Job>> {
        let tables = self.tables.lock();
        let mut due: Vec<Job> = tables
            .jobs
            .values()
            .filter(|j| j.payout_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|j| (j.completed_at, j.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn find_job_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<Job>> {
        Ok(self
            .tables
            .lock()
            .jobs
            .values()
            .find(|j| j.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn create_request(
        &self,
        request: &CleanerRequest,
        job: &Job,
    ) -> StoreResult<Job> {
        let mut tables = self.tables.lock();
        tables.check_version(job)?;
        let duplicate = tables.requests.values().any(|r| {
            r.job_id == request.job_id && r.cleaner_id == request.cleaner_id && r.status.is_live()
        });
        if duplicate {
            return Err(StoreError::Duplicate);
        }

        tables.requests.insert(request.id, request.clone());
        Ok(tables.write_job(job))
    }

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<CleanerRequest>> {
        Ok(self.tables.lock().requests.get(&id).cloned())
    }

    async fn list_requests(&self, job_id: Uuid) -> StoreResult<Vec<CleanerRequestView>> {
        let tables = self.tables.lock();
        let mut requests: Vec<&CleanerRequest> = tables
            .requests
            .values()
            .filter(|r| r.job_id == job_id)
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        Ok(requests
            .into_iter()
            .map(|r| CleanerRequestView {
                request: r.clone(),
                cleaner: tables.summary(r.cleaner_id),
            })
            .collect())
    }

    async fn accept_request(
        &self,
        job: &Job,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Acceptance> {
        let mut tables = self.tables.lock();
        tables.check_version(job)?;

        let request = tables
            .requests
            .get_mut(&request_id)
            .ok_or(StoreError::NotFound("request"))?;
        if request.job_id != job.id || request.status != RequestStatus::Pending {
            return Err(StoreError::Conflict);
        }
        request.status = RequestStatus::Accepted;
        request.responded_at = Some(now);
        let accepted = request.clone();

        let declined = tables.decline_pending(job.id, Some(request_id), now);
        let job = tables.write_job(job);

        Ok(Acceptance {
            job,
            accepted,
            declined,
        })
    }

    async fn withdraw_request(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<CleanerRequest> {
        let mut tables = self.tables.lock();
        let request = tables
            .requests
            .get_mut(&request_id)
            .ok_or(StoreError::NotFound("request"))?;
        if request.status != RequestStatus::Pending {
            return Err(StoreError::Conflict);
        }
        request.status = RequestStatus::Withdrawn;
        request.responded_at = Some(now);
        Ok(request.clone())
    }

    async fn cancel_job(&self, job: &Job, now: DateTime<Utc>) -> StoreResult<Cancellation> {
        let mut tables = self.tables.lock();
        tables.check_version(job)?;
        let declined = tables.decline_pending(job.id, None, now);
        let job = tables.write_job(job);
        Ok(Cancellation { job, declined })
    }

    async fn get_connect_account(&self, cleaner_id: Uuid) -> StoreResult<Option<ConnectAccount>> {
        Ok(self.tables.lock().accounts.get(&cleaner_id).cloned())
    }

    async fn find_connect_account(&self, account_id: &str) -> StoreResult<Option<ConnectAccount>> {
        Ok(self
            .tables
            .lock()
            .accounts
            .values()
            .find(|a| a.account_id == account_id)
            .cloned())
    }

    async fn upsert_connect_account(&self, account: &ConnectAccount) -> StoreResult<()> {
        self.tables
            .lock()
            .accounts
            .insert(account.cleaner_id, account.clone());
        Ok(())
    }

    async fn record_webhook_event(&self, event_id: &str, _event_type: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .lock()
            .webhook_events
            .insert(event_id.to_string()))
    }

    async fn forget_webhook_event(&self, event_id: &str) -> StoreResult<()> {
        self.tables.lock().webhook_events.remove(event_id);
        Ok(())
    }

    async fn price_tiers(&self) -> StoreResult<Vec<PriceTier>> {
        Ok(self.tables.lock().price_tiers.clone())
    }

    async fn upsert_price_tiers(&self, tiers: &[PriceTier]) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        for tier in tiers {
            match tables
                .price_tiers
                .iter_mut()
                .find(|t| t.service_type == tier.service_type && t.min_sqm == tier.min_sqm)
            {
                Some(existing) => *existing = *tier,
                None => tables.price_tiers.push(*tier),
            }
        }
        Ok(())
    }
}
