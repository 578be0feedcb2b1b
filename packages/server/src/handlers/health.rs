use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use tracing::warn;

use crate::models::monitoring::{ComponentCheck, HealthResponse};
use crate::state::AppState;

/// Readiness of the server and the components it depends on.
///
/// An unreachable database makes the server `unhealthy` (503). An unreachable
/// queue only makes it `degraded`, since submissions are still recorded and
/// the reconciler enqueues them later.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Monitoring",
    operation_id = "health",
    responses(
        (status = 200, description = "Healthy or degraded", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();

    let database = match state.db.ping().await {
        Ok(()) => ComponentCheck::healthy(),
        Err(e) => {
            warn!(error = %e, "Health check: database unreachable");
            ComponentCheck::unhealthy(e.to_string())
        }
    };
    let queue = match state.queue.depth().await {
        Ok(_) => ComponentCheck::healthy(),
        Err(e) => {
            warn!(error = %e, "Health check: queue unreachable");
            ComponentCheck::unhealthy(e.to_string())
        }
    };

    let (code, status) = if !database.is_healthy() {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else if !queue.is_healthy() {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };

    checks.insert("database".to_string(), database);
    checks.insert("queue".to_string(), queue);

    (code, Json(HealthResponse { status, checks }))
}
