use chrono::{DateTime, Utc};
use common::JobStatus;
use serde::{Deserialize, Serialize};
use store::JobRecord;
use uuid::Uuid;

/// Multipart form accepted by `POST /jobs`. Documentation only; the handler
/// reads the fields from the multipart stream.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct SubmitJobForm {
    /// Input file handed to the external workflow.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Destination the external workflow should act on.
    #[schema(example = "db-123")]
    pub target_identifier: String,
}

/// Returned immediately after a job is accepted.
#[derive(Serialize, utoipa::ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    #[schema(example = "queued")]
    pub status: JobStatus,
}

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    /// Status to list. Default: `queued`.
    #[param(example = "dispatched")]
    pub status: Option<String>,
    /// Maximum number of records (1-200, default 50).
    #[param(example = 50)]
    pub limit: Option<u64>,
}

/// Full audit record of one job.
#[derive(Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub job_id: Uuid,
    #[schema(example = "dispatched")]
    pub status: JobStatus,
    #[schema(example = "receipt.png")]
    pub source_name: String,
    #[schema(example = "db-123")]
    pub target_identifier: String,
    #[schema(example = "image/png")]
    pub content_type: Option<String>,
    #[schema(example = 1)]
    pub dispatch_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Set exactly when `status` is `success` or `failure`.
    pub completed_at: Option<DateTime<Utc>>,
    #[schema(example = "dispatch_exhausted")]
    pub result_message: Option<String>,
    #[schema(example = "doc://A1")]
    pub result_reference: Option<String>,
}

impl From<JobRecord> for JobResponse {
    fn from(m: JobRecord) -> Self {
        Self {
            job_id: m.job_id,
            status: m.status,
            source_name: m.source_name,
            target_identifier: m.target_identifier,
            content_type: m.content_type,
            dispatch_attempts: m.dispatch_attempts,
            created_at: m.created_at,
            updated_at: m.updated_at,
            dispatched_at: m.dispatched_at,
            completed_at: m.completed_at,
            result_message: m.result_message,
            result_reference: m.result_reference,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub data: Vec<JobResponse>,
}
