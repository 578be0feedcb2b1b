use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(job_routes(config))
        .routes(routes!(handlers::callback::receive_callback))
        .merge(monitoring_routes())
}

fn job_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let submit = OpenApiRouter::new()
        .routes(routes!(handlers::jobs::submit_job, handlers::jobs::list_jobs))
        .layer(handlers::jobs::submit_body_limit(
            config.submission.max_payload_bytes,
        ));

    submit.routes(routes!(handlers::jobs::get_job))
}

fn monitoring_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::monitoring::get_stats))
        .routes(routes!(handlers::monitoring::list_failures))
        .routes(routes!(handlers::health::health))
}
