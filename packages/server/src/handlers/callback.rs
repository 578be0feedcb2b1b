use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use common::{CALLBACK_TOKEN_HEADER, CallbackReport};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::handlers::jobs::parse_job_id;
use crate::services::callback::{CallbackAck, authorize, receive};
use crate::state::AppState;

/// Receive a job outcome from the external workflow.
#[utoipa::path(
    post,
    path = "/jobs/{job_id}/callback",
    tag = "Callbacks",
    operation_id = "receiveCallback",
    summary = "Report a job outcome",
    description = "Called by the external workflow once it has finished a job. The shared \
        secret must be sent in the `X-Callback-Token` header. Callbacks for jobs that are \
        already `success` or `failure` are accepted and leave the job unchanged.",
    params(
        ("job_id" = Uuid, Path, description = "Job ID"),
        ("X-Callback-Token" = String, Header, description = "Shared callback secret"),
    ),
    request_body = CallbackReport,
    responses(
        (status = 200, description = "Callback accepted", body = CallbackAck),
        (status = 400, description = "Malformed body, job id, or reserved message (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Missing or invalid token (UNAUTHORIZED)", body = ErrorBody),
        (status = 404, description = "Job not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Reported status is not terminal (INVALID_TRANSITION)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers, body))]
pub async fn receive_callback(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>, AppError> {
    let secret = &state.config.callback.secret;
    let provided = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    // Nothing about the request is reported back until the token checks out.
    authorize(secret, provided)?;

    let job_id = parse_job_id(&job_id)?;
    let report: CallbackReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid callback body: {e}")))?;

    let ack = receive(&state.db, secret, job_id, provided, report).await?;
    Ok(Json(ack))
}
