use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mq::MqConfig;
use store::init_db;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use worker::{Dispatcher, HttpTrigger, WorkerAppConfig, run_dispatch_loops};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize audit store")?;

    let queue: Arc<mq::Mq> = Arc::new(
        mq::init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?,
    );

    let trigger = HttpTrigger::new(
        config.dispatch.trigger_url.clone(),
        config.dispatch.api_key.clone(),
        Duration::from_secs(config.dispatch.trigger_timeout_secs),
    )
    .context("Failed to build trigger client")?;

    info!(
        queue_name = %config.mq.queue_name,
        trigger_url = %config.dispatch.trigger_url,
        concurrency = config.worker.concurrency,
        max_attempts = config.dispatch.retry.max_attempts,
        "MQ connected"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        db,
        queue,
        Arc::new(trigger),
        config.dispatch.clone(),
    ));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received, finishing in-flight deliveries");
        shutdown.cancel();
    });

    run_dispatch_loops(dispatcher, &config.worker.id, config.worker.concurrency, cancel).await;

    info!("Worker stopped");
    Ok(())
}
