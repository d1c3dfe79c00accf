mod common;

use chrono::Duration;
use uuid::Uuid;

use cleaning_marketplace::domain::notifications::{AlertKind, NotificationType};
use cleaning_marketplace::domain::{CompleteJobInput, JobStatus, Money, PayoutStatus};
use cleaning_marketplace::lifecycle::{
    payout_idempotency_key, Clock, LifecycleError, PayoutOutcome, PAYOUT_STUCK_AFTER,
};
use cleaning_marketplace::services::Task;
use cleaning_marketplace::sweep::{run_payout_sweep, SweepReport};

use common::{business_day, generic_failure, insufficient_funds, Harness};

/// Confirmed, authorized and started; ready to complete.
async fn in_progress(h: &Harness, landlord: Uuid, cleaner: Uuid) -> Uuid {
    let job = h.confirmed(landlord, cleaner).await;
    h.lifecycle
        .authorize_job_payment(job.id, landlord)
        .await
        .unwrap();
    h.lifecycle
        .start_job_and_capture_payment(job.id, cleaner)
        .await
        .unwrap();
    job.id
}

#[tokio::test]
async fn unsettled_funds_leave_payout_pending_with_backoff() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_settling").await;
    let job_id = in_progress(&h, Uuid::new_v4(), cleaner).await;
    h.gateway
        .script_transfer("acct_settling", Err(insufficient_funds()));

    let outcome = h
        .lifecycle
        .complete_job_and_payout(job_id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    let job = outcome.job;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.payout_status, PayoutStatus::Pending);
    assert_eq!(job.payout_attempts, 1);
    assert!(job
        .payout_pending_reason
        .as_deref()
        .unwrap()
        .contains("Insufficient funds"));
    assert_eq!(
        job.next_payout_attempt_at,
        Some(h.clock.now() + Duration::hours(12))
    );
    assert!(h.tasks.alerts().is_empty());

    let transfers = h.gateway.calls().transfers;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, Money::from_minor(90_000));
    assert_eq!(transfers[0].currency, "nok");
    assert_eq!(transfers[0].idempotency_key, payout_idempotency_key(job_id, 0));
}

#[tokio::test]
async fn processor_rejection_fails_payout_and_alerts() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_gone").await;
    let job_id = in_progress(&h, Uuid::new_v4(), cleaner).await;
    h.gateway.script_transfer("acct_gone", Err(generic_failure()));

    let outcome = h
        .lifecycle
        .complete_job_and_payout(job_id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    assert!(matches!(outcome.payout, PayoutOutcome::Failed { .. }));
    let job = outcome.job;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.payout_status, PayoutStatus::Failed);
    assert!(job.payout_error.is_some());
    assert_eq!(job.next_payout_attempt_at, None);
    assert_eq!(h.tasks.alerts(), vec![(Some(job_id), AlertKind::PayoutFailed)]);
}

#[tokio::test]
async fn payout_waits_for_an_onboarded_account() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    let job_id = in_progress(&h, Uuid::new_v4(), cleaner).await;

    let outcome = h
        .lifecycle
        .complete_job_and_payout(job_id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    match &outcome.payout {
        PayoutOutcome::Pending { reason } => assert!(reason.contains("payout account")),
        other => panic!("expected pending payout, got {other:?}"),
    }
    assert_eq!(outcome.job.payout_attempts, 0);
    assert!(outcome.job.payout_pending_reason.is_some());
    assert!(h.gateway.calls().transfers.is_empty());
}

#[tokio::test]
async fn payout_waits_for_captured_payment() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_ready").await;
    let job = h.confirmed(Uuid::new_v4(), cleaner).await;
    h.lifecycle.start_job(job.id, cleaner).await.unwrap();

    let outcome = h
        .lifecycle
        .complete_job_and_payout(job.id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    assert!(matches!(outcome.payout, PayoutOutcome::Pending { .. }));
    assert_eq!(outcome.job.status, JobStatus::Completed);
    assert!(h.gateway.calls().transfers.is_empty());
}

#[tokio::test]
async fn sweep_counts_each_outcome() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let (paid, settling, rejected) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.payout_account(paid, "acct_paid").await;
    h.payout_account(settling, "acct_settling").await;
    h.payout_account(rejected, "acct_rejected").await;
    h.gateway
        .script_transfer("acct_settling", Err(insufficient_funds()));
    h.gateway.script_transfer("acct_rejected", Err(generic_failure()));

    let a = h.completed_and_paid(landlord, paid).await;
    let b = h.completed_and_paid(landlord, settling).await;
    let c = h.completed_and_paid(landlord, rejected).await;

    let report = run_payout_sweep(&h.lifecycle, 100).await;

    assert_eq!(
        report,
        SweepReport {
            processed: 3,
            successful: 1,
            failed: 1,
            deferred: 1,
        }
    );
    assert_eq!(h.job(a.id).await.payout_status, PayoutStatus::Paid);
    assert_eq!(h.job(b.id).await.payout_status, PayoutStatus::Pending);
    assert_eq!(h.job(c.id).await.payout_status, PayoutStatus::Failed);
}

#[tokio::test]
async fn sweep_pages_past_deferred_jobs() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let mut ids = Vec::new();
    for _ in 0..5 {
        // No payout accounts: every job stays eligible after its attempt
        ids.push(h.completed_and_paid(landlord, Uuid::new_v4()).await.id);
    }

    let report = run_payout_sweep(&h.lifecycle, 2).await;

    assert_eq!(report.processed, 5);
    assert_eq!(report.deferred, 5);
}

#[tokio::test]
async fn sweep_skips_jobs_still_backing_off() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_backoff").await;
    let job_id = in_progress(&h, Uuid::new_v4(), cleaner).await;
    h.gateway
        .script_transfer("acct_backoff", Err(insufficient_funds()));
    h.lifecycle
        .complete_job_and_payout(job_id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    h.clock.advance(Duration::hours(6));
    assert_eq!(run_payout_sweep(&h.lifecycle, 10).await, SweepReport::default());

    h.clock.advance(Duration::hours(7));
    let report = run_payout_sweep(&h.lifecycle, 10).await;
    assert_eq!(report.successful, 1);

    let job = h.job(job_id).await;
    assert_eq!(job.payout_status, PayoutStatus::Paid);
    let keys: Vec<String> = h
        .gateway
        .calls()
        .transfers
        .into_iter()
        .map(|t| t.idempotency_key)
        .collect();
    assert_eq!(
        keys,
        vec![
            payout_idempotency_key(job_id, 0),
            payout_idempotency_key(job_id, 1)
        ]
    );
}

#[tokio::test]
async fn long_settlement_delay_alerts_operator_once() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_slow").await;
    let job = h.completed_and_paid(Uuid::new_v4(), cleaner).await;

    for _ in 0..PAYOUT_STUCK_AFTER + 1 {
        h.gateway
            .script_transfer("acct_slow", Err(insufficient_funds()));
        let report = run_payout_sweep(&h.lifecycle, 10).await;
        assert_eq!(report.deferred, 1);
        h.clock.advance(Duration::days(8));
    }

    let job = h.job(job.id).await;
    assert_eq!(job.payout_attempts, PAYOUT_STUCK_AFTER + 1);
    assert_eq!(job.payout_status, PayoutStatus::Pending);
    assert_eq!(h.tasks.alerts(), vec![(Some(job.id), AlertKind::PayoutStuck)]);

    // The cleaner hears about the delay once, on the first attempt
    let delayed = h
        .tasks
        .tasks()
        .into_iter()
        .filter(|t| {
            matches!(
                t,
                Task::Notify {
                    kind: NotificationType::PayoutDelayed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(delayed, 1);
}

#[tokio::test]
async fn operator_retry_sends_failed_payout() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_fixed").await;
    let job_id = in_progress(&h, Uuid::new_v4(), cleaner).await;
    h.gateway.script_transfer("acct_fixed", Err(generic_failure()));
    h.lifecycle
        .complete_job_and_payout(job_id, cleaner, CompleteJobInput::default())
        .await
        .unwrap();

    let (job, outcome) = h.lifecycle.retry_payout(job_id).await.unwrap();

    assert!(matches!(outcome, PayoutOutcome::Paid { transfer_id: Some(_) }));
    assert_eq!(job.payout_status, PayoutStatus::Paid);
    assert_eq!(job.payout_error, None);
    let transfers = h.gateway.calls().transfers;
    assert_eq!(transfers.len(), 2);
    assert_ne!(transfers[0].idempotency_key, transfers[1].idempotency_key);

    let err = h.lifecycle.retry_payout(job_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

#[tokio::test]
async fn retry_needs_a_completed_paid_job() {
    let h = Harness::new();
    let job = h.confirmed(Uuid::new_v4(), Uuid::new_v4()).await;

    let err = h.lifecycle.retry_payout(job.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

#[tokio::test]
async fn paid_payout_is_not_sent_twice() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    h.payout_account(cleaner, "acct_once").await;
    let job = h.completed_and_paid(Uuid::new_v4(), cleaner).await;

    let first = run_payout_sweep(&h.lifecycle, 10).await;
    let second = run_payout_sweep(&h.lifecycle, 10).await;

    assert_eq!(first.successful, 1);
    assert_eq!(second, SweepReport::default());
    assert_eq!(h.gateway.calls().transfers.len(), 1);
    assert_eq!(h.job(job.id).await.payout_status, PayoutStatus::Paid);
    assert_eq!(h.job(job.id).await.scheduled_date, business_day());
}
