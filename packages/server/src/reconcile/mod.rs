mod stale;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ReconcileConfig, SubmissionConfig};

pub use stale::{requeue_stale_queued, time_out_dispatched};

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// `queued` jobs put back on the queue.
    pub requeued: u64,
    /// `queued` jobs failed with `queue_timeout`.
    pub queue_timed_out: u64,
    /// `dispatched` jobs failed with `callback_timeout`.
    pub callback_timed_out: u64,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run the reconciler as a background task until `cancel` fires.
pub async fn run_reconciler(
    db: DatabaseConnection,
    queue: Arc<mq::Mq>,
    config: ReconcileConfig,
    submission: SubmissionConfig,
    cancel: CancellationToken,
) {
    let scan_interval = Duration::from_secs(config.scan_interval_secs.max(1));

    info!(
        scan_interval_secs = config.scan_interval_secs,
        stale_queued_secs = config.stale_queued_secs,
        queued_max_age_secs = config.queued_max_age_secs,
        callback_timeout_secs = config.callback_timeout_secs,
        "Starting reconciler"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Reconciler stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        match reconcile_once(&db, queue.as_ref(), &config, &submission).await {
            Ok(report) if !report.is_empty() => {
                info!(
                    requeued = report.requeued,
                    queue_timed_out = report.queue_timed_out,
                    callback_timed_out = report.callback_timed_out,
                    "Reconciliation pass finished"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Reconciliation pass failed"),
        }
    }
}

/// One full pass over stale `queued` and `dispatched` jobs.
pub async fn reconcile_once(
    db: &DatabaseConnection,
    queue: &mq::Mq,
    config: &ReconcileConfig,
    submission: &SubmissionConfig,
) -> anyhow::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    requeue_stale_queued(db, queue, config, submission, &mut report).await?;
    time_out_dispatched(db, config, &mut report).await?;

    Ok(report)
}
