use thiserror::Error;

/// Failures that leave a delivery unfinished, so it comes back after the
/// visibility timeout.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("MQ error: {0}")]
    Mq(#[from] mq::MqError),

    #[error("Audit store error: {0}")]
    Store(#[from] store::StoreError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
