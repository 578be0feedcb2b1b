use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use store::StatusCounts;

use super::job::JobResponse;
use super::shared::Pagination;

/// Queue occupancy at the time of the request.
#[derive(Serialize, utoipa::ToSchema)]
pub struct QueueDepthResponse {
    /// Items visible to workers right now.
    #[schema(example = 4)]
    pub ready: u64,
    /// Items in flight or waiting for a retry delay.
    #[schema(example = 2)]
    pub pending: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct StatusCountsResponse {
    #[schema(example = 6)]
    pub queued: u64,
    #[schema(example = 3)]
    pub dispatched: u64,
    #[schema(example = 120)]
    pub success: u64,
    #[schema(example = 2)]
    pub failure: u64,
}

impl From<StatusCounts> for StatusCountsResponse {
    fn from(c: StatusCounts) -> Self {
        Self {
            queued: c.queued,
            dispatched: c.dispatched,
            success: c.success,
            failure: c.failure,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub queue: QueueDepthResponse,
    pub jobs: StatusCountsResponse,
}

/// Query parameters for listing engine-side failures.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListFailuresParams {
    /// Only this reason: `dispatch_exhausted`, `callback_timeout` or `queue_timeout`.
    #[param(example = "dispatch_exhausted")]
    pub reason: Option<String>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FailureListResponse {
    pub data: Vec<JobResponse>,
    pub pagination: Pagination,
}

/// Result of probing one dependency.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ComponentCheck {
    /// `healthy` or `unhealthy`.
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Error seen while probing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentCheck {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            message: None,
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: "unhealthy",
            message: Some(message),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// `healthy`, `degraded` (queue down) or `unhealthy` (database down).
    #[schema(example = "healthy")]
    pub status: &'static str,
    /// Per-component results keyed by `database` and `queue`.
    pub checks: BTreeMap<String, ComponentCheck>,
}
