//! Payout retry sweep
//!
//! Re-drives payouts left pending on completed, paid jobs. One job's
//! outcome never stops the sweep; it always finishes and reports counts.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::lifecycle::{JobLifecycle, PayoutOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    /// Still pending after the attempt, neither paid nor failed
    pub deferred: u32,
}

impl SweepReport {
    fn record(&mut self, outcome: &PayoutOutcome) {
        self.processed += 1;
        match outcome {
            PayoutOutcome::Paid { .. } => self.successful += 1,
            PayoutOutcome::Failed { .. } => self.failed += 1,
            PayoutOutcome::Pending { .. } => self.deferred += 1,
        }
    }
}

/// Attempt every payout that is due now, `batch_size` jobs per query.
pub async fn run_payout_sweep(lifecycle: &JobLifecycle, batch_size: i64) -> SweepReport {
    let started = Instant::now();
    let now = lifecycle.clock().now();
    let batch_size = batch_size.max(1);

    let mut report = SweepReport::default();
    let mut seen: HashSet<Uuid> = HashSet::new();

    tracing::info!(batch_size, "Payout sweep started");

    loop {
        // Deferred jobs stay eligible, so widen the window past the ones
        // already handled this run
        let limit = batch_size + seen.len() as i64;
        let jobs = match lifecycle.store().jobs_awaiting_payout(now, limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load jobs awaiting payout");
                break;
            }
        };
        let exhausted = (jobs.len() as i64) < limit;

        let fresh: Vec<_> = jobs.into_iter().filter(|j| !seen.contains(&j.id)).collect();
        if fresh.is_empty() {
            break;
        }

        for job in fresh {
            seen.insert(job.id);
            let job_id = job.id;
            let (_, outcome) = lifecycle.attempt_payout(job).await;
            tracing::debug!(job_id = %job_id, outcome = ?outcome, "Sweep payout attempted");
            report.record(&outcome);
        }

        if exhausted {
            break;
        }
    }

    tracing::info!(
        processed = report.processed,
        successful = report.successful,
        failed = report.failed,
        deferred = report.deferred,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Payout sweep finished"
    );

    report
}

/// Scheduler that runs the sweep on `cron` (six fields, seconds first).
/// Not started; the caller owns `start()`.
pub async fn build_sweep_scheduler(
    lifecycle: Arc<JobLifecycle>,
    cron: &str,
    batch_size: i64,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let job = Job::new_async(cron, move |_uuid, _l| {
        let lifecycle = lifecycle.clone();
        Box::pin(async move {
            run_payout_sweep(&lifecycle, batch_size).await;
        })
    })
    .with_context(|| format!("creating payout sweep job for cron {cron}"))?;

    sched.add(job).await.context("adding payout sweep job")?;
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_pending_separately() {
        let mut report = SweepReport::default();
        report.record(&PayoutOutcome::Paid {
            transfer_id: Some("tr_1".to_string()),
        });
        report.record(&PayoutOutcome::Pending {
            reason: "insufficient funds".to_string(),
        });
        report.record(&PayoutOutcome::Failed {
            reason: "account closed".to_string(),
        });

        assert_eq!(
            report,
            SweepReport {
                processed: 3,
                successful: 1,
                failed: 1,
                deferred: 1,
            }
        );
    }
}
