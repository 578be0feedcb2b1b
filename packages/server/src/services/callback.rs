use common::{CallbackReport, FailureReason, JobStatus};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use store::{StoreError, UpdateOutcome, audit_store};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::secret::secrets_match;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Missing or invalid callback token")]
    Unauthorized,

    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    InvalidReport(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Acknowledgement returned to the external workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CallbackAck {
    pub job_id: Uuid,
    /// Status of the record after the callback was processed.
    #[schema(example = "success")]
    pub status: JobStatus,
    /// False when the job was already terminal and the callback changed nothing.
    pub applied: bool,
}

/// Check the token presented with a callback.
///
/// An empty token never authenticates, not even against an empty secret.
pub fn authorize(expected_secret: &str, provided_secret: Option<&str>) -> Result<(), CallbackError> {
    match provided_secret {
        Some(provided)
            if !expected_secret.is_empty()
                && !provided.is_empty()
                && secrets_match(expected_secret, provided) =>
        {
            Ok(())
        }
        _ => {
            warn!("Rejected callback with missing or invalid token");
            Err(CallbackError::Unauthorized)
        }
    }
}

/// Apply an outcome reported by the external workflow.
///
/// The token is checked before the job is looked up, so a bad token never
/// reveals whether a job exists. Repeated callbacks for a terminal job are
/// accepted without changing it.
pub async fn receive(
    db: &DatabaseConnection,
    expected_secret: &str,
    job_id: Uuid,
    provided_secret: Option<&str>,
    report: CallbackReport,
) -> Result<CallbackAck, CallbackError> {
    authorize(expected_secret, provided_secret)?;

    if !report.status.is_terminal() {
        return Err(CallbackError::InvalidTransition(format!(
            "Callbacks may only report success or failure, got '{}'",
            report.status
        )));
    }

    // Reserved reasons identify engine-side failures in the monitoring views.
    if let Some(message) = report.message.as_deref()
        && FailureReason::is_reserved(message)
    {
        return Err(CallbackError::InvalidReport(format!(
            "message '{message}' is reserved for failures recorded by the engine"
        )));
    }

    let outcome = audit_store(db)
        .complete(
            job_id,
            report.status,
            report.message,
            report.result_reference,
        )
        .await?;

    match outcome {
        UpdateOutcome::Applied(record) => {
            info!(job_id = %job_id, status = %record.status, "Job completed by callback");
            Ok(CallbackAck {
                job_id,
                status: record.status,
                applied: true,
            })
        }
        UpdateOutcome::Rejected { current } => {
            info!(
                job_id = %job_id,
                current = %current.status,
                reported = %report.status,
                "Job already terminal, ignoring duplicate callback"
            );
            Ok(CallbackAck {
                job_id,
                status: current.status,
                applied: false,
            })
        }
        UpdateOutcome::NotFound => Err(CallbackError::NotFound(job_id)),
    }
}
