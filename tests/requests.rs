mod common;

use chrono::Duration;
use uuid::Uuid;

use cleaning_marketplace::domain::{CreateRequestInput, JobStatus, RequestStatus};
use cleaning_marketplace::lifecycle::{Clock, LifecycleError};
use cleaning_marketplace::store::memory::CleanerProfile;
use cleaning_marketplace::store::{JobStore, StoreError};

use common::{business_day, Harness};

fn offer(message: &str) -> CreateRequestInput {
    CreateRequestInput {
        message: Some(message.to_string()),
    }
}

#[tokio::test]
async fn accepting_one_declines_the_rest() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;

    let cleaners: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let mut requests = Vec::new();
    for cleaner in &cleaners {
        let request = h
            .lifecycle
            .request_job(job.id, *cleaner, CreateRequestInput::default())
            .await
            .unwrap();
        requests.push(request);
    }
    assert_eq!(h.job(job.id).await.status, JobStatus::Requested);

    let chosen = &requests[2];
    let acceptance = h
        .lifecycle
        .accept_request(job.id, chosen.id, landlord)
        .await
        .unwrap();

    assert_eq!(acceptance.accepted.id, chosen.id);
    assert_eq!(acceptance.accepted.status, RequestStatus::Accepted);
    assert_eq!(acceptance.declined.len(), 3);
    assert_eq!(acceptance.job.assigned_cleaner_id, Some(cleaners[2]));
    assert_eq!(acceptance.job.status, JobStatus::Confirmed);

    let stored = h.store.requests_for(job.id);
    let accepted = stored
        .iter()
        .filter(|r| r.status == RequestStatus::Accepted)
        .count();
    let declined = stored
        .iter()
        .filter(|r| r.status == RequestStatus::Declined)
        .count();
    assert_eq!((accepted, declined), (1, 3));
    assert!(stored
        .iter()
        .filter(|r| r.status == RequestStatus::Declined)
        .all(|r| r.responded_at.is_some()));
}

#[tokio::test]
async fn second_live_request_from_same_cleaner_is_duplicate() {
    let h = Harness::new();
    let job = h.book(Uuid::new_v4(), business_day(), 1000).await;
    let cleaner = Uuid::new_v4();

    h.lifecycle
        .request_job(job.id, cleaner, offer("Available all day"))
        .await
        .unwrap();
    let err = h
        .lifecycle
        .request_job(job.id, cleaner, offer("Me again"))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::DuplicateRequest));
    assert_eq!(h.store.requests_for(job.id).len(), 1);
}

#[tokio::test]
async fn withdrawn_request_can_be_made_again() {
    let h = Harness::new();
    let job = h.book(Uuid::new_v4(), business_day(), 1000).await;
    let cleaner = Uuid::new_v4();

    let first = h
        .lifecycle
        .request_job(job.id, cleaner, CreateRequestInput::default())
        .await
        .unwrap();
    let withdrawn = h
        .lifecycle
        .withdraw_request(first.id, cleaner)
        .await
        .unwrap();
    assert_eq!(withdrawn.status, RequestStatus::Withdrawn);

    // The job does not fall back to pending
    assert_eq!(h.job(job.id).await.status, JobStatus::Requested);

    let second = h
        .lifecycle
        .request_job(job.id, cleaner, CreateRequestInput::default())
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, RequestStatus::Pending);
}

#[tokio::test]
async fn only_the_requester_withdraws_and_only_while_pending() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    let cleaner = Uuid::new_v4();
    let request = h
        .lifecycle
        .request_job(job.id, cleaner, CreateRequestInput::default())
        .await
        .unwrap();

    let err = h
        .lifecycle
        .withdraw_request(request.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden(_)));

    h.lifecycle
        .accept_request(job.id, request.id, landlord)
        .await
        .unwrap();
    let err = h
        .lifecycle
        .withdraw_request(request.id, cleaner)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

#[tokio::test]
async fn landlord_cannot_request_own_job() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;

    let err = h
        .lifecycle
        .request_job(job.id, landlord, CreateRequestInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden(_)));
    assert_eq!(h.job(job.id).await.status, JobStatus::Pending);
}

#[tokio::test]
async fn assigned_job_takes_no_more_requests() {
    let h = Harness::new();
    let job = h.confirmed(Uuid::new_v4(), Uuid::new_v4()).await;

    let err = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
}

#[tokio::test]
async fn overlong_message_is_rejected() {
    let h = Harness::new();
    let job = h.book(Uuid::new_v4(), business_day(), 1000).await;

    let err = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), offer(&"x".repeat(1001)))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(h.store.requests_for(job.id).is_empty());
}

#[tokio::test]
async fn accepting_after_assignment_fails() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    let a = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap();
    let b = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap();

    h.lifecycle.accept_request(job.id, a.id, landlord).await.unwrap();
    let err = h
        .lifecycle
        .accept_request(job.id, b.id, landlord)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
    assert_eq!(h.job(job.id).await.assigned_cleaner_id, Some(a.cleaner_id));
}

#[tokio::test]
async fn racing_acceptance_on_a_stale_job_is_rejected() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    let a = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap();
    let b = h
        .lifecycle
        .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap();

    // Both acceptances were prepared from the same snapshot
    let snapshot = h.job(job.id).await;
    let now = h.clock.now();
    let mut first = snapshot.clone();
    first.status = JobStatus::Confirmed;
    first.assigned_cleaner_id = Some(a.cleaner_id);
    let mut second = snapshot;
    second.status = JobStatus::Confirmed;
    second.assigned_cleaner_id = Some(b.cleaner_id);

    h.store.accept_request(&first, a.id, now).await.unwrap();
    let err = h.store.accept_request(&second, b.id, now).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict));
    let stored = h.job(job.id).await;
    assert_eq!(stored.assigned_cleaner_id, Some(a.cleaner_id));
    let accepted: Vec<_> = h
        .store
        .requests_for(job.id)
        .into_iter()
        .filter(|r| r.status == RequestStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_bind_exactly_one_cleaner() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    let mut requests = Vec::new();
    for _ in 0..4 {
        let request = h
            .lifecycle
            .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
            .await
            .unwrap();
        requests.push(request);
    }

    let handles: Vec<_> = requests
        .iter()
        .map(|request| {
            let lifecycle = h.lifecycle.clone();
            let (job_id, request_id) = (job.id, request.id);
            tokio::spawn(async move { lifecycle.accept_request(job_id, request_id, landlord).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(acceptance) => winners.push(acceptance.accepted.cleaner_id),
            Err(e) => assert!(matches!(e, LifecycleError::InvalidState(_)), "{e:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let stored = h.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Confirmed);
    assert_eq!(stored.assigned_cleaner_id, Some(winners[0]));
    let accepted: Vec<_> = h
        .store
        .requests_for(job.id)
        .into_iter()
        .filter(|r| r.status == RequestStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].cleaner_id, winners[0]);
}

#[tokio::test]
async fn accepting_a_request_from_another_job_is_not_found() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    let other = h.book(landlord, business_day(), 700).await;
    let request = h
        .lifecycle
        .request_job(other.id, Uuid::new_v4(), CreateRequestInput::default())
        .await
        .unwrap();

    let err = h
        .lifecycle
        .accept_request(job.id, request.id, landlord)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
}

#[tokio::test]
async fn landlord_sees_newest_requests_first_with_cleaner_details() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;

    let early = Uuid::new_v4();
    let late = Uuid::new_v4();
    h.store.insert_profile(
        late,
        CleanerProfile {
            full_name: Some("Kari Nordmann".to_string()),
            email: Some("kari@example.no".to_string()),
            company_name: Some("Renhold AS".to_string()),
            has_hms_card: true,
        },
    );

    h.lifecycle
        .request_job(job.id, early, CreateRequestInput::default())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(5));
    h.lifecycle
        .request_job(job.id, late, offer("Can bring supplies"))
        .await
        .unwrap();

    let views = h
        .lifecycle
        .list_requests_for_job(job.id, landlord)
        .await
        .unwrap();

    assert_eq!(views.len(), 2);
    assert_eq!(views[0].request.cleaner_id, late);
    assert_eq!(views[0].cleaner.full_name.as_deref(), Some("Kari Nordmann"));
    assert!(views[0].cleaner.has_hms_card);
    assert_eq!(views[0].cleaner.completed_jobs, 0);
    assert_eq!(views[1].request.cleaner_id, early);
    assert_eq!(views[1].cleaner.full_name, None);

    let err = h
        .lifecycle
        .list_requests_for_job(job.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden(_)));
}

#[tokio::test]
async fn cancelling_declines_pending_requests() {
    let h = Harness::new();
    let landlord = Uuid::new_v4();
    let job = h.book(landlord, business_day(), 1000).await;
    for _ in 0..2 {
        h.lifecycle
            .request_job(job.id, Uuid::new_v4(), CreateRequestInput::default())
            .await
            .unwrap();
    }

    h.lifecycle.cancel_job(job.id, landlord).await.unwrap();

    assert!(h
        .store
        .requests_for(job.id)
        .iter()
        .all(|r| r.status == RequestStatus::Declined));
}
