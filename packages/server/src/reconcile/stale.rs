use chrono::{DateTime, Utc};
use common::{FailureReason, JobStatus, WorkItem};
use sea_orm::DatabaseConnection;
use store::{JobRecord, UpdateOutcome, audit_store};
use tracing::{error, info, warn};

use super::ReconcileReport;
use crate::config::{ReconcileConfig, SubmissionConfig};
use crate::services::submission::enqueue_with_retry;

fn seconds_ago(secs: u64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64)
}

/// Give stuck `queued` jobs another trip through the queue, or fail them once
/// they are older than `queued_max_age_secs`.
///
/// Enqueueing an item that is still on the queue is a no-op, so a job whose
/// item is merely delayed by a retry backoff is left alone.
pub async fn requeue_stale_queued(
    db: &DatabaseConnection,
    queue: &mq::Mq,
    config: &ReconcileConfig,
    submission: &SubmissionConfig,
    report: &mut ReconcileReport,
) -> anyhow::Result<()> {
    let store = audit_store(db);
    let stale = store
        .stale_queued(seconds_ago(config.stale_queued_secs), config.batch_size)
        .await?;

    if stale.is_empty() {
        return Ok(());
    }

    info!(count = stale.len(), "Found stale queued jobs");

    let max_age = seconds_ago(config.queued_max_age_secs);

    for job in stale {
        if job.created_at < max_age {
            expire_queued(db, &job, report).await;
            continue;
        }

        if let Err(e) = requeue(db, queue, &job, submission, report).await {
            error!(job_id = %job.job_id, error = %e, "Failed to requeue stale job");
        }
    }

    Ok(())
}

async fn requeue(
    db: &DatabaseConnection,
    queue: &mq::Mq,
    job: &JobRecord,
    submission: &SubmissionConfig,
    report: &mut ReconcileReport,
) -> anyhow::Result<()> {
    let store = audit_store(db);

    let Some(payload) = store.payload(job.job_id).await? else {
        warn!(job_id = %job.job_id, "Stale queued job has no stored payload");
        expire_queued(db, job, report).await;
        return Ok(());
    };

    let item = WorkItem::new(
        job.job_id,
        job.source_name.clone(),
        job.target_identifier.clone(),
        job.content_type.clone(),
        payload,
    );
    enqueue_with_retry(queue, &item, submission).await?;

    // Restart the staleness clock so the next pass does not enqueue it again.
    if store.touch_queued(job.job_id).await?.is_applied() {
        info!(job_id = %job.job_id, attempts = job.dispatch_attempts, "Requeued stale job");
        report.requeued += 1;
    }

    Ok(())
}

async fn expire_queued(db: &DatabaseConnection, job: &JobRecord, report: &mut ReconcileReport) {
    match audit_store(db)
        .fail(job.job_id, JobStatus::Queued, FailureReason::QUEUE_TIMEOUT)
        .await
    {
        Ok(UpdateOutcome::Applied(_)) => {
            warn!(job_id = %job.job_id, created_at = %job.created_at, "Queued job timed out");
            report.queue_timed_out += 1;
        }
        Ok(_) => {}
        Err(e) => error!(job_id = %job.job_id, error = %e, "Failed to time out queued job"),
    }
}

/// Fail `dispatched` jobs whose callback never arrived.
pub async fn time_out_dispatched(
    db: &DatabaseConnection,
    config: &ReconcileConfig,
    report: &mut ReconcileReport,
) -> anyhow::Result<()> {
    let store = audit_store(db);
    let stale = store
        .stale_dispatched(seconds_ago(config.callback_timeout_secs), config.batch_size)
        .await?;

    for job in stale {
        match store
            .fail(job.job_id, JobStatus::Dispatched, FailureReason::CALLBACK_TIMEOUT)
            .await
        {
            Ok(UpdateOutcome::Applied(_)) => {
                warn!(
                    job_id = %job.job_id,
                    dispatched_at = ?job.dispatched_at,
                    "No callback received, job timed out"
                );
                report.callback_timed_out += 1;
            }
            // A callback won the race.
            Ok(_) => {}
            Err(e) => error!(job_id = %job.job_id, error = %e, "Failed to time out dispatched job"),
        }
    }

    Ok(())
}
