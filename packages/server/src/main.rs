use std::sync::Arc;

use anyhow::Context;
use mq::MqConfig;
use server::config::AppConfig;
use server::reconcile::run_reconciler;
use server::state::AppState;
use store::init_db;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize audit store")?;

    let queue: Arc<mq::Mq> = Arc::new(
        mq::init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to connect to queue")?,
    );
    info!(queue = %config.mq.queue_name, "Connected to queue");

    let cancel = CancellationToken::new();

    if config.reconcile.enabled {
        tokio::spawn(run_reconciler(
            db.clone(),
            queue.clone(),
            config.reconcile.clone(),
            config.submission.clone(),
            cancel.clone(),
        ));
    } else {
        info!("Reconciler disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        db,
        queue,
        config,
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
