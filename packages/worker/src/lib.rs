pub mod config;
pub mod dispatcher;
pub mod error;
pub mod trigger;

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use config::{DispatchConfig, WorkerAppConfig, WorkerConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{Result, WorkerError};
pub use trigger::{HttpTrigger, TriggerError, TriggerRequest, WorkflowTrigger};

/// Run `concurrency` dispatch loops sharing one dispatcher until `cancel` fires
/// and every loop has finished its current delivery.
pub async fn run_dispatch_loops(
    dispatcher: Arc<Dispatcher>,
    worker_id: &str,
    concurrency: usize,
    cancel: CancellationToken,
) {
    let mut loops = JoinSet::new();

    for i in 0..concurrency.max(1) {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        let loop_id = format!("{worker_id}-{i}");
        loops.spawn(async move { dispatcher.run(&loop_id, cancel).await });
    }

    info!(worker_id, loops = loops.len(), "Dispatch loops running");

    while let Some(joined) = loops.join_next().await {
        if let Err(e) = joined {
            error!(worker_id, error = %e, "Dispatch loop panicked");
        }
    }
}
