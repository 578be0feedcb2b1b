use common::retry::calculate_backoff;
use common::{JobStatus, WorkItem};
use mq::MqError;
use sea_orm::DatabaseConnection;
use store::{NewJob, StoreError, audit_store};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SubmissionConfig;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Rejected before any record was written.
    #[error("{0}")]
    Validation(String),

    /// The audit record could not be written. Nothing was enqueued.
    #[error("Failed to record job: {0}")]
    Store(#[from] StoreError),
}

/// An accepted upload, ready to become a job.
#[derive(Debug, Clone)]
pub struct Submission {
    pub source_name: String,
    pub target_identifier: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// False when the record exists but the item could not be enqueued.
    /// The reconciler enqueues it later.
    pub enqueued: bool,
}

pub fn validate_submission(
    submission: &Submission,
    config: &SubmissionConfig,
) -> Result<(), SubmitError> {
    if submission.payload.is_empty() {
        return Err(SubmitError::Validation("file must not be empty".into()));
    }
    if submission.payload.len() > config.max_payload_bytes {
        return Err(SubmitError::Validation(format!(
            "file exceeds the maximum size of {} bytes",
            config.max_payload_bytes
        )));
    }

    let target = submission.target_identifier.trim();
    if target.is_empty() {
        return Err(SubmitError::Validation(
            "target_identifier must not be empty".into(),
        ));
    }
    if target.chars().count() > config.max_target_len {
        return Err(SubmitError::Validation(format!(
            "target_identifier must be at most {} characters",
            config.max_target_len
        )));
    }

    Ok(())
}

/// Record a new job and hand it to the dispatch queue.
///
/// The record is always written before the item is enqueued. Returns as soon
/// as both steps are done; never waits for dispatch.
pub async fn submit(
    db: &DatabaseConnection,
    queue: &mq::Mq,
    config: &SubmissionConfig,
    submission: Submission,
) -> Result<Submitted, SubmitError> {
    validate_submission(&submission, config)?;

    let job_id = Uuid::now_v7();
    let target_identifier = submission.target_identifier.trim().to_string();

    let new_job = NewJob {
        job_id,
        source_name: submission.source_name.clone(),
        target_identifier: target_identifier.clone(),
        content_type: submission.content_type.clone(),
        payload: submission.payload.clone(),
    };
    create_with_retry(db, new_job, config).await?;

    let item = WorkItem::new(
        job_id,
        submission.source_name,
        target_identifier,
        submission.content_type,
        submission.payload,
    );

    let enqueued = match enqueue_with_retry(queue, &item, config).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                job_id = %job_id,
                error = %e,
                "Job recorded but could not be enqueued, leaving it to the reconciler"
            );
            false
        }
    };

    info!(
        job_id = %job_id,
        source_name = %item.source_name,
        target_identifier = %item.target_identifier,
        size = item.payload.len(),
        enqueued,
        "Job submitted"
    );

    Ok(Submitted {
        job_id,
        status: JobStatus::Queued,
        enqueued,
    })
}

async fn create_with_retry(
    db: &DatabaseConnection,
    job: NewJob,
    config: &SubmissionConfig,
) -> Result<(), StoreError> {
    let store = audit_store(db);
    let job_id = job.job_id;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match store.create(job.clone()).await {
            Ok(_) => return Ok(()),
            // An earlier attempt committed even though we saw an error.
            Err(StoreError::Duplicate(_)) if attempt > 1 => return Ok(()),
            Err(e) if e.is_transient() && attempt < config.retry_attempts => {
                let delay = calculate_backoff(attempt, config.retry_base_ms, config.retry_base_ms * 16);
                warn!(
                    job_id = %job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying audit record creation"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(job_id = %job_id, attempt, error = %e, "Failed to create audit record");
                return Err(e);
            }
        }
    }
}

/// Enqueue `item`, retrying transient queue errors with backoff.
pub(crate) async fn enqueue_with_retry(
    queue: &mq::Mq,
    item: &WorkItem,
    config: &SubmissionConfig,
) -> Result<(), MqError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match mq::publish(queue, item).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < config.retry_attempts => {
                let delay = calculate_backoff(attempt, config.retry_base_ms, config.retry_base_ms * 16);
                warn!(
                    job_id = %item.job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying enqueue"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
