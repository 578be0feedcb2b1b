use axum::{
    Json,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::JobStatus;
use store::audit_store;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::models::job::*;
use crate::services::submission::{Submission, submit};
use crate::state::AppState;

/// Slack on top of the payload limit for multipart framing and the other form fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body limit layer for the submission route.
pub fn submit_body_limit(max_payload_bytes: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_payload_bytes.saturating_add(MULTIPART_OVERHEAD))
}

/// Submit a new job.
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "Jobs",
    operation_id = "submitJob",
    summary = "Submit a job",
    description = "Records a new job and enqueues it for dispatch. Returns immediately with the \
        job id; dispatch and completion happen asynchronously. The `file` and \
        `target_identifier` multipart fields are required.",
    request_body(content_type = "multipart/form-data", content = SubmitJobForm),
    responses(
        (status = 202, description = "Job accepted", body = SubmitJobResponse),
        (status = 400, description = "Missing, empty or oversized input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 500, description = "Job could not be recorded (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    let mut target_identifier: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("target_identifier") => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read target_identifier: {e}"))
                })?;
                target_identifier = Some(text);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (file_name, content_type, payload) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    let target_identifier = target_identifier
        .ok_or_else(|| AppError::Validation("Missing 'target_identifier' field".into()))?;

    let source_name = file_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "upload".to_string());

    let submitted = submit(
        &state.db,
        state.queue.as_ref(),
        &state.config.submission,
        Submission {
            source_name,
            target_identifier,
            content_type,
            payload,
        },
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: submitted.job_id,
            status: submitted.status,
        }),
    ))
}

/// Get a job's audit record.
#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    tag = "Jobs",
    operation_id = "getJob",
    summary = "Get job status",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job record", body = JobResponse),
        (status = 400, description = "Malformed job id (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "Job not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id = parse_job_id(&job_id)?;

    let record = audit_store(&state.db)
        .get(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    Ok(Json(record.into()))
}

/// List jobs in one status.
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "Jobs",
    operation_id = "listJobs",
    summary = "List jobs by status",
    description = "Returns the most recently created jobs in the given status.",
    params(ListJobsParams),
    responses(
        (status = 200, description = "Jobs in the requested status", body = JobListResponse),
        (status = 400, description = "Unknown status (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?
        .unwrap_or(JobStatus::Queued);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let records = audit_store(&state.db).list_by_status(status, limit).await?;

    Ok(Json(JobListResponse {
        data: records.into_iter().map(Into::into).collect(),
    }))
}

pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid job id '{raw}'")))
}
