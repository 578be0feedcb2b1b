use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Header carrying the shared secret on callback requests.
pub const CALLBACK_TOKEN_HEADER: &str = "X-Callback-Token";

/// Outcome report sent by the external workflow once it has finished a job.
#[derive(Clone, Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CallbackReport {
    /// Reported outcome. Only `success` and `failure` are accepted.
    #[schema(example = "success")]
    pub status: JobStatus,
    /// Free-text outcome detail or error description.
    #[schema(example = "Extracted 12 fields")]
    pub message: Option<String>,
    /// External reference to the produced artifact.
    #[schema(example = "doc://A1")]
    pub result_reference: Option<String>,
}
