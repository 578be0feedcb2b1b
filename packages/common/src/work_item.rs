use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mq::Message;

/// A unit of work placed on the dispatch queue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    /// Job this item belongs to. The audit record always exists before the item is enqueued.
    pub job_id: Uuid,
    /// Descriptive label of the input (usually the uploaded filename).
    pub source_name: String,
    /// Destination the external workflow should act on.
    pub target_identifier: String,
    /// MIME type of `payload`, if known.
    pub content_type: Option<String>,
    /// Raw input bytes, base64 encoded on the wire.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl WorkItem {
    pub fn new(
        job_id: Uuid,
        source_name: impl Into<String>,
        target_identifier: impl Into<String>,
        content_type: Option<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            job_id,
            source_name: source_name.into(),
            target_identifier: target_identifier.into(),
            content_type,
            payload,
        }
    }
}

impl Message for WorkItem {
    fn message_type() -> &'static str {
        "work_item"
    }

    fn message_id(&self) -> String {
        self.job_id.to_string()
    }

    fn source(&self) -> Option<String> {
        Some(self.source_name.clone())
    }
}

/// Serde adapter storing bytes as standard base64.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
