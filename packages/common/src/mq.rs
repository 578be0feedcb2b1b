use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, error};

/// Core trait for all MQ messages
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    /// Stable identity of the message. Enqueueing the same id twice while the
    /// first copy is still queued does not create a second item.
    fn message_id(&self) -> String;

    fn source(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub enqueued_at: DateTime<Utc>,
    pub source: Option<String>,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            enqueued_at: Utc::now(),
            source: None,
        }
    }
}

/// Message envelope for transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_type: String,
    pub message_id: String,
    pub metadata: MessageMetadata,
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Create envelope from typed message
    pub fn from_message<M: Message>(message: &M) -> Result<Self, MessageError> {
        let message_type = M::message_type().to_string();
        let message_id = message.message_id();

        debug!(
            message_type = %message_type,
            message_id = %message_id,
            "Creating message envelope"
        );

        Ok(Self {
            message_type,
            message_id,
            metadata: MessageMetadata {
                enqueued_at: Utc::now(),
                source: message.source(),
            },
            payload: serde_json::to_value(message)?,
        })
    }

    /// Deserialize into typed message
    pub fn into_message<M: Message>(self) -> Result<M, MessageError> {
        if self.message_type != M::message_type() {
            error!(
                expected = M::message_type(),
                actual = %self.message_type,
                message_id = %self.message_id,
                "Message type mismatch"
            );
            return Err(MessageError::TypeMismatch {
                expected: M::message_type().to_string(),
                actual: self.message_type,
            });
        }

        serde_json::from_value(self.payload).map_err(|e| {
            error!(error = %e, message_id = %self.message_id, "Deserialization failed");
            MessageError::Serialization(e)
        })
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}
