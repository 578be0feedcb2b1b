use axum::{
    Json,
    extract::{Query, State},
};
use common::FailureReason;
use store::audit_store;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::models::monitoring::*;
use crate::models::shared::Pagination;
use crate::state::AppState;

/// Highest page number `list_failures` accepts.
const MAX_PAGE: u64 = 1_000_000;

/// Queue depth and job counts per status.
#[utoipa::path(
    get,
    path = "/monitoring/stats",
    tag = "Monitoring",
    operation_id = "getStats",
    summary = "Get queue and job statistics",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse),
        (status = 500, description = "Queue or store unreachable (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let depth = state.queue.depth().await?;
    let counts = audit_store(&state.db).count_by_status().await?;

    Ok(Json(StatsResponse {
        queue: QueueDepthResponse {
            ready: depth.ready,
            pending: depth.pending,
        },
        jobs: counts.into(),
    }))
}

/// Jobs the engine gave up on.
#[utoipa::path(
    get,
    path = "/monitoring/failures",
    tag = "Monitoring",
    operation_id = "listFailures",
    summary = "List engine-side failures",
    description = "Returns failed jobs whose reason was recorded by the engine itself \
        (`dispatch_exhausted`, `callback_timeout`, `queue_timeout`), newest first.",
    params(ListFailuresParams),
    responses(
        (status = 200, description = "Failed jobs", body = FailureListResponse),
        (status = 400, description = "Unknown reason or page out of range (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn list_failures(
    State(state): State<AppState>,
    Query(params): Query<ListFailuresParams>,
) -> Result<Json<FailureListResponse>, AppError> {
    if let Some(reason) = params.reason.as_deref()
        && !FailureReason::is_reserved(reason)
    {
        return Err(AppError::Validation(format!(
            "Unknown reason '{reason}'. Valid values: {}",
            FailureReason::ALL.join(", ")
        )));
    }

    let page = params.page.unwrap_or(1).max(1);
    if page > MAX_PAGE {
        return Err(AppError::Validation(format!("page must be at most {MAX_PAGE}")));
    }
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let (records, total) = audit_store(&state.db)
        .list_failures(params.reason.as_deref(), page, per_page)
        .await?;

    Ok(Json(FailureListResponse {
        data: records.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}
