use std::time::Duration;

use async_trait::async_trait;
use common::WorkItem;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Largest chunk of an error response body kept for logs.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Trigger call timed out")]
    Timeout,

    #[error("Trigger endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Trigger request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for TriggerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TriggerError::Timeout
        } else {
            TriggerError::Request(e)
        }
    }
}

/// Body of a trigger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerRequest {
    pub job_id: Uuid,
    pub target_identifier: String,
    pub source_name: String,
    pub content_type: Option<String>,
    #[serde(with = "common::work_item::base64_bytes")]
    pub payload: Vec<u8>,
    /// Where the external workflow reports the outcome.
    pub callback_url: String,
}

impl TriggerRequest {
    pub fn new(item: WorkItem, callback_url: String) -> Self {
        Self {
            job_id: item.job_id,
            target_identifier: item.target_identifier,
            source_name: item.source_name,
            content_type: item.content_type,
            payload: item.payload,
            callback_url,
        }
    }
}

/// Hands a job to the external workflow.
///
/// `Ok` means the workflow acknowledged receipt, not that it finished. The
/// outcome arrives later through the callback endpoint. A job may be
/// triggered more than once when a delivery is repeated.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn trigger(&self, request: &TriggerRequest) -> Result<(), TriggerError>;
}

/// Triggers the workflow with a JSON `POST`.
#[derive(Debug, Clone)]
pub struct HttpTrigger {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTrigger {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TriggerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl WorkflowTrigger for HttpTrigger {
    async fn trigger(&self, request: &TriggerRequest) -> Result<(), TriggerError> {
        let mut req = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }

        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = res.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        Err(TriggerError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
