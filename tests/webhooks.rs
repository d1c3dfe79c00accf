mod common;

use serde_json::json;
use uuid::Uuid;

use cleaning_marketplace::domain::{
    CreateConnectAccountInput, JobStatus, PaymentStatus, WebhookEnvelope,
};
use cleaning_marketplace::gateway::{GatewayError, IntentStatus, WebhookError, WebhookVerifier};
use cleaning_marketplace::lifecycle::{Clock, WebhookOutcome};
use cleaning_marketplace::store::JobStore;

use common::Harness;

const SECRET: &str = "whsec_integration";

fn body(event_id: &str, event_type: &str, object: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": object }
    }))
    .unwrap()
}

/// Sign and verify `payload` the way the endpoint does.
fn deliver(h: &Harness, payload: &[u8]) -> WebhookEnvelope {
    let verifier = WebhookVerifier::new(SECRET);
    let now = h.clock.now();
    let header = verifier.sign(now.timestamp(), payload);
    verifier.parse(payload, Some(&header), now).unwrap()
}

/// A job with a hold the browser has not confirmed yet.
async fn awaiting_hold(h: &Harness) -> (Uuid, String) {
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, common::business_day(), 1000).await;
    h.gateway
        .set_authorize_status(IntentStatus::RequiresPaymentMethod);
    let auth = h
        .lifecycle
        .authorize_job_payment(job.id, landlord)
        .await
        .unwrap();
    let intent = auth.job.stripe_payment_intent_id.unwrap();
    (job.id, intent)
}

#[tokio::test]
async fn signed_delivery_is_verified_and_applied() {
    let h = Harness::new();
    let (job_id, intent) = awaiting_hold(&h).await;

    let payload = body(
        "evt_hold",
        "payment_intent.amount_capturable_updated",
        json!({ "id": intent }),
    );
    let envelope = deliver(&h, &payload);
    let outcome = h.lifecycle.apply_webhook_event(&envelope).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied);
    assert_eq!(h.job(job_id).await.payment_status, PaymentStatus::Authorized);
}

#[tokio::test]
async fn forged_delivery_is_rejected() {
    let h = Harness::new();
    let payload = body("evt_forged", "payment_intent.succeeded", json!({ "id": "pi_x" }));
    let now = h.clock.now();
    let header = WebhookVerifier::new("whsec_someone_else").sign(now.timestamp(), &payload);

    let err = WebhookVerifier::new(SECRET)
        .parse(&payload, Some(&header), now)
        .unwrap_err();
    assert!(matches!(err, WebhookError::SignatureMismatch));
}

#[tokio::test]
async fn redelivered_event_is_applied_once() {
    let h = Harness::new();
    let (job_id, intent) = awaiting_hold(&h).await;
    let envelope = deliver(
        &h,
        &body("evt_paid", "payment_intent.succeeded", json!({ "id": intent })),
    );

    let first = h.lifecycle.apply_webhook_event(&envelope).await.unwrap();
    let version = h.job(job_id).await.version;
    let second = h.lifecycle.apply_webhook_event(&envelope).await.unwrap();

    assert_eq!(first, WebhookOutcome::Applied);
    assert_eq!(second, WebhookOutcome::Duplicate);
    assert_eq!(h.job(job_id).await.version, version);
    assert_eq!(h.job(job_id).await.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn late_failure_does_not_undo_a_paid_charge() {
    let h = Harness::new();
    let (job_id, intent) = awaiting_hold(&h).await;

    let paid = deliver(
        &h,
        &body("evt_ok", "payment_intent.succeeded", json!({ "id": intent })),
    );
    let failed = deliver(
        &h,
        &body(
            "evt_fail",
            "payment_intent.payment_failed",
            json!({ "id": intent, "last_payment_error": { "message": "card declined" } }),
        ),
    );

    h.lifecycle.apply_webhook_event(&paid).await.unwrap();
    let outcome = h.lifecycle.apply_webhook_event(&failed).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Ignored);
    let job = h.job(job_id).await;
    assert_eq!(job.payment_status, PaymentStatus::Paid);
    assert_eq!(job.capture_error, None);
}

#[tokio::test]
async fn failure_then_success_ends_paid() {
    let h = Harness::new();
    let (job_id, intent) = awaiting_hold(&h).await;

    let failed = deliver(
        &h,
        &body(
            "evt_fail_first",
            "payment_intent.payment_failed",
            json!({ "id": intent, "last_payment_error": { "message": "insufficient balance" } }),
        ),
    );
    h.lifecycle.apply_webhook_event(&failed).await.unwrap();
    let job = h.job(job_id).await;
    assert_eq!(job.payment_status, PaymentStatus::Failed);
    assert_eq!(job.capture_error.as_deref(), Some("insufficient balance"));

    let paid = deliver(
        &h,
        &body("evt_ok_later", "payment_intent.succeeded", json!({ "id": intent })),
    );
    h.lifecycle.apply_webhook_event(&paid).await.unwrap();
    let job = h.job(job_id).await;
    assert_eq!(job.payment_status, PaymentStatus::Paid);
    assert_eq!(job.capture_error, None);
}

#[tokio::test]
async fn refund_applies_only_to_paid_charges() {
    let h = Harness::new();
    let (job_id, intent) = awaiting_hold(&h).await;
    let refund = |id: &str| {
        body(
            id,
            "charge.refunded",
            json!({ "id": "ch_1", "payment_intent": intent, "refunded": true }),
        )
    };

    let early = deliver(&h, &refund("evt_refund_early"));
    assert_eq!(
        h.lifecycle.apply_webhook_event(&early).await.unwrap(),
        WebhookOutcome::Ignored
    );
    assert_eq!(h.job(job_id).await.payment_status, PaymentStatus::Pending);

    let paid = deliver(
        &h,
        &body("evt_paid_before_refund", "payment_intent.succeeded", json!({ "id": intent })),
    );
    h.lifecycle.apply_webhook_event(&paid).await.unwrap();

    let refunded = deliver(&h, &refund("evt_refund"));
    assert_eq!(
        h.lifecycle.apply_webhook_event(&refunded).await.unwrap(),
        WebhookOutcome::Applied
    );
    assert_eq!(h.job(job_id).await.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn partial_refund_is_ignored() {
    let h = Harness::new();
    let envelope = deliver(
        &h,
        &body(
            "evt_partial",
            "charge.refunded",
            json!({ "id": "ch_2", "payment_intent": "pi_any", "refunded": false }),
        ),
    );
    assert_eq!(
        h.lifecycle.apply_webhook_event(&envelope).await.unwrap(),
        WebhookOutcome::Ignored
    );
}

#[tokio::test]
async fn hold_on_cancelled_job_is_not_recorded() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, common::business_day(), 1000).await;
    h.gateway
        .set_authorize_status(IntentStatus::RequiresPaymentMethod);
    let intent = h
        .lifecycle
        .authorize_job_payment(job.id, landlord)
        .await
        .unwrap()
        .job
        .stripe_payment_intent_id
        .unwrap();
    h.gateway
        .script_cancel(Err(GatewayError::Transient("try later".to_string())));
    h.lifecycle.cancel_job(job.id, landlord).await.unwrap();

    let envelope = deliver(
        &h,
        &body(
            "evt_late_hold",
            "payment_intent.amount_capturable_updated",
            json!({ "id": intent }),
        ),
    );
    let outcome = h.lifecycle.apply_webhook_event(&envelope).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Ignored);
    let job = h.job(job.id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn account_update_mirrors_onboarding_state() {
    let h = Harness::new();
    let cleaner = Uuid::new_v4();
    let account = h
        .lifecycle
        .create_connect_account(
            cleaner,
            CreateConnectAccountInput {
                email: "cleaner@example.no".to_string(),
                country: "no".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(!account.payouts_enabled);

    let envelope = deliver(
        &h,
        &body(
            "evt_acct",
            "account.updated",
            json!({
                "id": account.account_id,
                "charges_enabled": true,
                "payouts_enabled": true,
                "details_submitted": true
            }),
        ),
    );
    let outcome = h.lifecycle.apply_webhook_event(&envelope).await.unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied);
    let stored = h.store.get_connect_account(cleaner).await.unwrap().unwrap();
    assert!(stored.payouts_enabled);
    assert!(stored.details_submitted);
    assert_eq!(stored.payout_blocker(), None);
}

#[tokio::test]
async fn events_for_unknown_objects_are_unmatched() {
    let h = Harness::new();

    let payment = deliver(
        &h,
        &body("evt_stray_pi", "payment_intent.succeeded", json!({ "id": "pi_nobody" })),
    );
    let account = deliver(
        &h,
        &body("evt_stray_acct", "account.updated", json!({ "id": "acct_nobody" })),
    );

    assert_eq!(
        h.lifecycle.apply_webhook_event(&payment).await.unwrap(),
        WebhookOutcome::Unmatched
    );
    assert_eq!(
        h.lifecycle.apply_webhook_event(&account).await.unwrap(),
        WebhookOutcome::Unmatched
    );
}

#[tokio::test]
async fn unknown_event_types_are_ignored() {
    let h = Harness::new();
    let envelope = deliver(
        &h,
        &body("evt_other", "customer.created", json!({ "id": "cus_1" })),
    );
    assert_eq!(
        h.lifecycle.apply_webhook_event(&envelope).await.unwrap(),
        WebhookOutcome::Ignored
    );
}
