use common::mq::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Internal(String),
}

impl From<redis::RedisError> for MqError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            MqError::Connection(e.to_string())
        } else {
            MqError::Internal(e.to_string())
        }
    }
}
