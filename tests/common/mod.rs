//! Shared fixtures for lifecycle tests: in-memory store and queue, a fixed
//! clock and a payment gateway whose answers are scripted per test.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use cleaning_marketplace::domain::{
    AccountStatus, CompleteJobInput, ConnectAccount, CreateJobInput, CreateRequestInput, Job,
    Money, OnboardingLink, PricingInput, ServiceType,
};
use cleaning_marketplace::gateway::{
    AuthorizeCharge, ChargeAuthorization, GatewayError, GatewayResult, IntentStatus,
    PaymentGateway, Transfer, TransferRequest,
};
use cleaning_marketplace::lifecycle::{Clock, FixedClock, JobLifecycle, LifecycleConfig};
use cleaning_marketplace::services::InMemoryTaskQueue;
use cleaning_marketplace::store::{InMemoryJobStore, JobStore};

// ============================================================================
// Scripted gateway
// ============================================================================

#[derive(Default)]
struct Script {
    transfers: HashMap<String, VecDeque<GatewayResult<()>>>,
    captures: VecDeque<GatewayResult<()>>,
    cancels: VecDeque<GatewayResult<()>>,
    intent_status: Option<IntentStatus>,
    authorize_status: Option<IntentStatus>,
    accounts_created: u32,
}

/// Calls the gateway received, in order
#[derive(Default, Debug, Clone)]
pub struct Calls {
    pub authorizations: Vec<AuthorizeCharge>,
    pub captures: Vec<(String, String)>,
    pub cancels: Vec<(String, String)>,
    pub transfers: Vec<TransferRequest>,
    pub status_lookups: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

impl ScriptedGateway {
    /// Queue the outcome of the next transfer to `account_id`. Unscripted
    /// transfers succeed.
    pub fn script_transfer(&self, account_id: &str, result: GatewayResult<()>) {
        self.script
            .lock()
            .transfers
            .entry(account_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn script_capture(&self, result: GatewayResult<()>) {
        self.script.lock().captures.push_back(result);
    }

    pub fn script_cancel(&self, result: GatewayResult<()>) {
        self.script.lock().cancels.push_back(result);
    }

    /// What a status lookup on any payment intent reports.
    pub fn set_intent_status(&self, status: IntentStatus) {
        self.script.lock().intent_status = Some(status);
    }

    /// Status returned by new authorizations; `RequiresCapture` by default.
    pub fn set_authorize_status(&self, status: IntentStatus) {
        self.script.lock().authorize_status = Some(status);
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().clone()
    }
}

pub fn insufficient_funds() -> GatewayError {
    GatewayError::Transient(
        "Insufficient funds in Stripe account. In test mode, you can add funds to your available balance".to_string(),
    )
}

pub fn generic_failure() -> GatewayError {
    GatewayError::Fatal("No such destination: 'acct_gone'".to_string())
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_connect_account(
        &self,
        _cleaner_id: Uuid,
        _email: &str,
        _country: &str,
    ) -> GatewayResult<AccountStatus> {
        let mut script = self.script.lock();
        script.accounts_created += 1;
        Ok(AccountStatus {
            account_id: format!("acct_test_{}", script.accounts_created),
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            disabled_reason: None,
        })
    }

    async fn onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        _refresh_url: &str,
    ) -> GatewayResult<OnboardingLink> {
        Ok(OnboardingLink {
            url: format!("https://connect.example/{}?return={}", account_id, return_url),
            expires_at: None,
        })
    }

    async fn account_status(&self, account_id: &str) -> GatewayResult<AccountStatus> {
        Ok(AccountStatus {
            account_id: account_id.to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
            disabled_reason: None,
        })
    }

    async fn authorize_charge(&self, request: &AuthorizeCharge) -> GatewayResult<ChargeAuthorization> {
        self.calls.lock().authorizations.push(request.clone());
        let status = self
            .script
            .lock()
            .authorize_status
            .clone()
            .unwrap_or(IntentStatus::RequiresCapture);
        Ok(ChargeAuthorization {
            payment_intent_id: format!("pi_{}", request.job_id.simple()),
            client_secret: Some(format!("pi_{}_secret", request.job_id.simple())),
            status,
        })
    }

    async fn payment_intent_status(&self, payment_intent_id: &str) -> GatewayResult<IntentStatus> {
        self.calls
            .lock()
            .status_lookups
            .push(payment_intent_id.to_string());
        Ok(self
            .script
            .lock()
            .intent_status
            .clone()
            .unwrap_or(IntentStatus::RequiresCapture))
    }

    async fn capture_authorized_charge(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()> {
        self.calls
            .lock()
            .captures
            .push((payment_intent_id.to_string(), idempotency_key.to_string()));
        self.script.lock().captures.pop_front().unwrap_or(Ok(()))
    }

    async fn cancel_authorization(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> GatewayResult<()> {
        self.calls
            .lock()
            .cancels
            .push((payment_intent_id.to_string(), idempotency_key.to_string()));
        self.script.lock().cancels.pop_front().unwrap_or(Ok(()))
    }

    async fn transfer_payout(&self, request: &TransferRequest) -> GatewayResult<Transfer> {
        let n = {
            let mut calls = self.calls.lock();
            calls.transfers.push(request.clone());
            calls.transfers.len()
        };
        let scripted = self
            .script
            .lock()
            .transfers
            .get_mut(&request.destination_account_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(()));
        scripted.map(|()| Transfer {
            transfer_id: format!("tr_test_{}", n),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn business_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

pub fn morning_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap())
}

pub struct Harness {
    pub lifecycle: Arc<JobLifecycle>,
    pub store: InMemoryJobStore,
    pub gateway: Arc<ScriptedGateway>,
    pub tasks: InMemoryTaskQueue,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    /// Clock at 08:00 UTC on [`business_day`], 10% platform fee.
    pub fn new() -> Self {
        let store = InMemoryJobStore::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let tasks = InMemoryTaskQueue::new();
        let clock = Arc::new(FixedClock::new(morning_of(business_day())));

        let lifecycle = Arc::new(JobLifecycle::new(
            Arc::new(store.clone()),
            gateway.clone(),
            Arc::new(tasks.clone()),
            clock.clone(),
            LifecycleConfig {
                platform_fee_bps: 1000,
                currency: "nok".to_string(),
                connect_return_url: "https://app.example/payouts/done".to_string(),
                connect_refresh_url: "https://app.example/payouts/refresh".to_string(),
            },
        ));

        Self {
            lifecycle,
            store,
            gateway,
            tasks,
            clock,
        }
    }

    pub async fn job(&self, job_id: Uuid) -> Job {
        self.store.get_job(job_id).await.unwrap().unwrap()
    }

    /// Book a job for `date` at `total` major units.
    pub async fn book(&self, landlord_id: Uuid, date: NaiveDate, total: i64) -> Job {
        self.lifecycle
            .create_job(
                landlord_id,
                CreateJobInput {
                    property_id: Uuid::new_v4(),
                    service_type: ServiceType::BnbCleaning,
                    scheduled_date: date,
                    scheduled_time: None,
                    special_instructions: None,
                    pricing: PricingInput::Total {
                        total_price: Money::from_minor(total * 100),
                    },
                },
            )
            .await
            .unwrap()
    }

    /// Book, request and accept: a confirmed job for today.
    pub async fn confirmed(&self, landlord_id: Uuid, cleaner_id: Uuid) -> Job {
        let job = self.book(landlord_id, business_day(), 1000).await;
        let request = self
            .lifecycle
            .request_job(job.id, cleaner_id, CreateRequestInput::default())
            .await
            .unwrap();
        self.lifecycle
            .accept_request(job.id, request.id, landlord_id)
            .await
            .unwrap()
            .job
    }

    /// Confirmed, authorized, started (captured) and completed without a
    /// payout attempt.
    pub async fn completed_and_paid(&self, landlord_id: Uuid, cleaner_id: Uuid) -> Job {
        let job = self.confirmed(landlord_id, cleaner_id).await;
        self.lifecycle
            .authorize_job_payment(job.id, landlord_id)
            .await
            .unwrap();
        self.lifecycle
            .start_job_and_capture_payment(job.id, cleaner_id)
            .await
            .unwrap();
        self.lifecycle
            .complete_job(job.id, cleaner_id, CompleteJobInput::default())
            .await
            .unwrap()
    }

    /// Give the cleaner an onboarded payout account with id `account_id`.
    pub async fn payout_account(&self, cleaner_id: Uuid, account_id: &str) {
        let now = self.clock.now();
        self.store
            .upsert_connect_account(&ConnectAccount {
                cleaner_id,
                account_id: account_id.to_string(),
                country: "NO".to_string(),
                charges_enabled: true,
                payouts_enabled: true,
                details_submitted: true,
                disabled_reason: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }
}
