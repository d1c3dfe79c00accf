//! PostgreSQL job store

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Acceptance, Cancellation, JobStore, StoreError, StoreResult};
use crate::domain::pricing::PriceTier;
use crate::domain::{
    CleanerRequest, CleanerRequestView, CleanerSummary, ConnectAccount, Job, JobScope, Money,
};

// ============================================================================
// Database Row Types
// ============================================================================

const JOB_COLUMNS: &str = r#"
    id, landlord_id, property_id, service_type, scheduled_date, scheduled_time,
    special_instructions, total_price_minor, platform_fee_minor, cleaner_payout_minor,
    assigned_cleaner_id, status, payment_status, payout_status,
    stripe_payment_intent_id, stripe_transfer_id, capture_error, payout_pending_reason,
    payout_error, payout_attempts, next_payout_attempt_at, rating, feedback,
    created_at, updated_at, started_at, completed_at, cancelled_at, payout_date, version
"#;

const REQUEST_COLUMNS: &str =
    "id, job_id, cleaner_id, message, status, requested_at, responded_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    landlord_id: Uuid,
    property_id: Uuid,
    service_type: String,
    scheduled_date: NaiveDate,
    scheduled_time: Option<NaiveTime>,
    special_instructions: Option<String>,
    total_price_minor: i64,
    platform_fee_minor: i64,
    cleaner_payout_minor: i64,
    assigned_cleaner_id: Option<Uuid>,
    status: String,
    payment_status: String,
    payout_status: String,
    stripe_payment_intent_id: Option<String>,
    stripe_transfer_id: Option<String>,
    capture_error: Option<String>,
    payout_pending_reason: Option<String>,
    payout_error: Option<String>,
    payout_attempts: i32,
    next_payout_attempt_at: Option<DateTime<Utc>>,
    rating: Option<i16>,
    feedback: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    payout_date: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            landlord_id: row.landlord_id,
            property_id: row.property_id,
            service_type: row.service_type.parse().map_err(corrupt)?,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time,
            special_instructions: row.special_instructions,
            total_price: Money::from_minor(row.total_price_minor),
            platform_fee: Money::from_minor(row.platform_fee_minor),
            cleaner_payout: Money::from_minor(row.cleaner_payout_minor),
            assigned_cleaner_id: row.assigned_cleaner_id,
            status: row.status.parse().map_err(corrupt)?,
            payment_status: row.payment_status.parse().map_err(corrupt)?,
            payout_status: row.payout_status.parse().map_err(corrupt)?,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            stripe_transfer_id: row.stripe_transfer_id,
            capture_error: row.capture_error,
            payout_pending_reason: row.payout_pending_reason,
            payout_error: row.payout_error,
            payout_attempts: row.payout_attempts,
            next_payout_attempt_at: row.next_payout_attempt_at,
            rating: row.rating,
            feedback: row.feedback,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            payout_date: row.payout_date,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    job_id: Uuid,
    cleaner_id: Uuid,
    message: Option<String>,
    status: String,
    requested_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<RequestRow> for CleanerRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(CleanerRequest {
            id: row.id,
            job_id: row.job_id,
            cleaner_id: row.cleaner_id,
            message: row.message,
            status: row.status.parse().map_err(corrupt)?,
            requested_at: row.requested_at,
            responded_at: row.responded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequestViewRow {
    id: Uuid,
    job_id: Uuid,
    cleaner_id: Uuid,
    message: Option<String>,
    status: String,
    requested_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    full_name: Option<String>,
    email: Option<String>,
    company_name: Option<String>,
    has_hms_card: Option<bool>,
    completed_jobs: Option<i64>,
    average_rating: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    cleaner_id: Uuid,
    account_id: String,
    country: String,
    charges_enabled: bool,
    payouts_enabled: bool,
    details_submitted: bool,
    disabled_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for ConnectAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            cleaner_id: row.cleaner_id,
            account_id: row.account_id,
            country: row.country,
            charges_enabled: row.charges_enabled,
            payouts_enabled: row.payouts_enabled,
            details_submitted: row.details_submitted,
            disabled_reason: row.disabled_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PriceTierRow {
    service_type: String,
    min_sqm: i32,
    max_sqm: Option<i32>,
    price_minor: i64,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn corrupt(e: crate::domain::UnknownVariant) -> StoreError {
    StoreError::Backend(anyhow!("corrupt row: {}", e))
}

fn db_error(e: sqlx::Error) -> StoreError {
    let unique_violation = e
        .as_database_error()
        .and_then(|d| d.code())
        .map_or(false, |code| code == "23505");

    if unique_violation {
        StoreError::Duplicate
    } else {
        StoreError::Backend(anyhow!(e))
    }
}

fn into_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

fn into_requests(rows: Vec<RequestRow>) -> StoreResult<Vec<CleanerRequest>> {
    rows.into_iter().map(CleanerRequest::try_from).collect()
}

/// Compare-and-set write of every mutable job column.
async fn write_job(tx: &mut Transaction<'_, Postgres>, job: &Job) -> StoreResult<Job> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE cleaning_jobs SET
            service_type = $3,
            scheduled_date = $4,
            scheduled_time = $5,
            special_instructions = $6,
            total_price_minor = $7,
            platform_fee_minor = $8,
            cleaner_payout_minor = $9,
            assigned_cleaner_id = $10,
            status = $11,
            payment_status = $12,
            payout_status = $13,
            stripe_payment_intent_id = $14,
            stripe_transfer_id = $15,
            capture_error = $16,
            payout_pending_reason = $17,
            payout_error = $18,
            payout_attempts = $19,
            next_payout_attempt_at = $20,
            rating = $21,
            feedback = $22,
            updated_at = $23,
            started_at = $24,
            completed_at = $25,
            cancelled_at = $26,
            payout_date = $27,
            version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.id)
    .bind(job.version)
    .bind(job.service_type.as_str())
    .bind(job.scheduled_date)
    .bind(job.scheduled_time)
    .bind(&job.special_instructions)
    .bind(job.total_price.minor())
    .bind(job.platform_fee.minor())
    .bind(job.cleaner_payout.minor())
    .bind(job.assigned_cleaner_id)
    .bind(job.status.as_str())
    .bind(job.payment_status.as_str())
    .bind(job.payout_status.as_str())
    .bind(&job.stripe_payment_intent_id)
    .bind(&job.stripe_transfer_id)
    .bind(&job.capture_error)
    .bind(&job.payout_pending_reason)
    .bind(&job.payout_error)
    .bind(job.payout_attempts)
    .bind(job.next_payout_attempt_at)
    .bind(job.rating)
    .bind(&job.feedback)
    .bind(job.updated_at)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.cancelled_at)
    .bind(job.payout_date)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error)?;

    match row {
        Some(row) => row.try_into(),
        None => {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cleaning_jobs WHERE id = $1)")
                    .bind(job.id)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(db_error)?;
            if exists {
                Err(StoreError::Conflict)
            } else {
                Err(StoreError::NotFound("job"))
            }
        }
    }
}

async fn decline_pending(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Uuid,
    except: Option<Uuid>,
    now: DateTime<Utc>,
) -> StoreResult<Vec<CleanerRequest>> {
    let rows = sqlx::query_as::<_, RequestRow>(&format!(
        r#"
        UPDATE cleaner_requests SET status = 'declined', responded_at = $3
        WHERE job_id = $1 AND status = 'pending' AND ($2::uuid IS NULL OR id <> $2)
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(except)
    .bind(now)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_error)?;

    into_requests(rows)
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(db_error)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO cleaning_jobs (
                id, landlord_id, property_id, service_type, scheduled_date, scheduled_time,
                special_instructions, total_price_minor, platform_fee_minor, cleaner_payout_minor,
                status, payment_status, payout_status, created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 1)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.id)
        .bind(job.landlord_id)
        .bind(job.property_id)
        .bind(job.service_type.as_str())
        .bind(job.scheduled_date)
        .bind(job.scheduled_time)
        .bind(&job.special_instructions)
        .bind(job.total_price.minor())
        .bind(job.platform_fee.minor())
        .bind(job.cleaner_payout.minor())
        .bind(job.status.as_str())
        .bind(job.payment_status.as_str())
        .bind(job.payout_status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cleaning_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(Job::try_from)
        .transpose()
    }

    async fn list_jobs(
        &self,
        scope: JobScope,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Job>, u64)> {
        let (landlord, cleaner, open_from, order) = match scope {
            JobScope::Landlord(id) => (Some(id), None, None, "created_at DESC"),
            JobScope::Cleaner(id) => (None, Some(id), None, "scheduled_date DESC"),
            JobScope::Open { from } => (None, None, Some(from), "scheduled_date, created_at"),
        };

        let filter = r#"
            ($1::uuid IS NULL OR landlord_id = $1)
            AND ($2::uuid IS NULL OR assigned_cleaner_id = $2)
            AND ($3::date IS NULL OR (
                status IN ('pending', 'requested')
                AND assigned_cleaner_id IS NULL
                AND scheduled_date >= $3
            ))
        "#;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM cleaning_jobs WHERE {filter}"))
                .bind(landlord)
                .bind(cleaner)
                .bind(open_from)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cleaning_jobs WHERE {filter} ORDER BY {order} LIMIT $4 OFFSET $5"
        ))
        .bind(landlord)
        .bind(cleaner)
        .bind(open_from)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok((into_jobs(rows)?, total as u64))
    }

    async fn update_job(&self, job: &Job) -> StoreResult<Job> {
        let mut tx = self.begin().await?;
        let stored = write_job(&mut tx, job).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn jobs_awaiting_payout(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM cleaning_jobs
            WHERE status = 'completed' AND payment_status = 'paid' AND payout_status = 'pending'
              AND (next_payout_attempt_at IS NULL OR next_payout_attempt_at <= $1)
            ORDER BY completed_at, id
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        into_jobs(rows)
    }

    async fn find_job_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<Job>> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cleaning_jobs WHERE stripe_payment_intent_id = $1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(Job::try_from)
        .transpose()
    }

    async fn create_request(
        &self,
        request: &CleanerRequest,
        job: &Job,
    ) -> StoreResult<Job> {
        let mut tx = self.begin().await?;

        // Job first so requests serialize with acceptance and cancellation.
        let stored = write_job(&mut tx, job).await?;

        sqlx::query(
            r#"
            INSERT INTO cleaner_requests (id, job_id, cleaner_id, message, status, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request.id)
        .bind(request.job_id)
        .bind(request.cleaner_id)
        .bind(&request.message)
        .bind(request.status.as_str())
        .bind(request.requested_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(stored)
    }

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<CleanerRequest>> {
        sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM cleaner_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(CleanerRequest::try_from)
        .transpose()
    }

    async fn list_requests(&self, job_id: Uuid) -> StoreResult<Vec<CleanerRequestView>> {
        let rows = sqlx::query_as::<_, RequestViewRow>(
            r#"
            SELECT
                r.id, r.job_id, r.cleaner_id, r.message, r.status, r.requested_at, r.responded_at,
                p.full_name, p.email, p.company_name,
                (p.hms_card_file_id IS NOT NULL) AS has_hms_card,
                stats.completed_jobs, stats.average_rating
            FROM cleaner_requests r
            LEFT JOIN profiles p ON p.id = r.cleaner_id
            LEFT JOIN LATERAL (
                SELECT COUNT(*) AS completed_jobs, AVG(j.rating)::float8 AS average_rating
                FROM cleaning_jobs j
                WHERE j.assigned_cleaner_id = r.cleaner_id AND j.status = 'completed'
            ) stats ON TRUE
            WHERE r.job_id = $1
            ORDER BY r.requested_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| {
                Ok(CleanerRequestView {
                    cleaner: CleanerSummary {
                        id: r.cleaner_id,
                        full_name: r.full_name,
                        email: r.email,
                        company_name: r.company_name,
                        has_hms_card: r.has_hms_card.unwrap_or(false),
                        completed_jobs: r.completed_jobs.unwrap_or(0),
                        average_rating: r.average_rating,
                    },
                    request: CleanerRequest {
                        id: r.id,
                        job_id: r.job_id,
                        cleaner_id: r.cleaner_id,
                        message: r.message,
                        status: r.status.parse().map_err(corrupt)?,
                        requested_at: r.requested_at,
                        responded_at: r.responded_at,
                    },
                })
            })
            .collect()
    }

    async fn accept_request(
        &self,
        job: &Job,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Acceptance> {
        let mut tx = self.begin().await?;

        // Locks the job row; a concurrent acceptance fails the version check.
        let stored = write_job(&mut tx, job).await?;

        let accepted = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE cleaner_requests SET status = 'accepted', responded_at = $3
            WHERE id = $1 AND job_id = $2 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(job.id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::Conflict)?;

        let declined = decline_pending(&mut tx, job.id, Some(request_id), now).await?;

        tx.commit().await.map_err(db_error)?;

        Ok(Acceptance {
            job: stored,
            accepted: accepted.try_into()?,
            declined,
        })
    }

    async fn withdraw_request(
        &self,
        request_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<CleanerRequest> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE cleaner_requests SET status = 'withdrawn', responded_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get_request(request_id).await? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::NotFound("request")),
            },
        }
    }

    async fn cancel_job(&self, job: &Job, now: DateTime<Utc>) -> StoreResult<Cancellation> {
        let mut tx = self.begin().await?;
        let stored = write_job(&mut tx, job).await?;
        let declined = decline_pending(&mut tx, job.id, None, now).await?;
        tx.commit().await.map_err(db_error)?;

        Ok(Cancellation {
            job: stored,
            declined,
        })
    }

    async fn get_connect_account(&self, cleaner_id: Uuid) -> StoreResult<Option<ConnectAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM connect_accounts WHERE cleaner_id = $1",
        )
        .bind(cleaner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_connect_account(&self, account_id: &str) -> StoreResult<Option<ConnectAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM connect_accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn upsert_connect_account(&self, account: &ConnectAccount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO connect_accounts (
                cleaner_id, account_id, country, charges_enabled, payouts_enabled,
                details_submitted, disabled_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (cleaner_id) DO UPDATE SET
                account_id = EXCLUDED.account_id,
                charges_enabled = EXCLUDED.charges_enabled,
                payouts_enabled = EXCLUDED.payouts_enabled,
                details_submitted = EXCLUDED.details_submitted,
                disabled_reason = EXCLUDED.disabled_reason,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(account.cleaner_id)
        .bind(&account.account_id)
        .bind(&account.country)
        .bind(account.charges_enabled)
        .bind(account.payouts_enabled)
        .bind(account.details_submitted)
        .bind(&account.disabled_reason)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn forget_webhook_event(&self, event_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn price_tiers(&self) -> StoreResult<Vec<PriceTier>> {
        let rows = sqlx::query_as::<_, PriceTierRow>(
            "SELECT service_type, min_sqm, max_sqm, price_minor FROM price_tiers ORDER BY service_type, min_sqm",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| {
                Ok(PriceTier {
                    service_type: r.service_type.parse().map_err(corrupt)?,
                    min_sqm: r.min_sqm.max(0) as u32,
                    max_sqm: r.max_sqm.map(|m| m.max(0) as u32),
                    price: Money::from_minor(r.price_minor),
                })
            })
            .collect()
    }

    async fn upsert_price_tiers(&self, tiers: &[PriceTier]) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        for tier in tiers {
            sqlx::query(
                r#"
                INSERT INTO price_tiers (service_type, min_sqm, max_sqm, price_minor)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (service_type, min_sqm) DO UPDATE SET
                    max_sqm = EXCLUDED.max_sqm,
                    price_minor = EXCLUDED.price_minor,
                    updated_at = NOW()
                "#,
            )
            .bind(tier.service_type.as_str())
            .bind(tier.min_sqm as i32)
            .bind(tier.max_sqm.map(|m| m as i32))
            .bind(tier.price.minor())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
