#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a job.
///
/// Transitions only ever move forward along
/// `queued -> dispatched -> {success | failure}`; `queued` may also jump
/// straight to a terminal state. Terminal states are absorbing.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Recorded and waiting in the queue for a dispatch worker.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "queued"))]
    Queued,
    /// Handed to the external workflow, waiting for its callback.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "dispatched"))]
    Dispatched,
    /// The external workflow reported success.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "success"))]
    Success,
    /// The external workflow reported failure, or the engine gave up on the job.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "failure"))]
    Failure,
}

impl JobStatus {
    /// Returns true for `success` and `failure`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether a record in `self` may move to `next`.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Dispatched)
                | (Self::Queued, Self::Success)
                | (Self::Queued, Self::Failure)
                | (Self::Dispatched, Self::Success)
                | (Self::Dispatched, Self::Failure)
        )
    }

    /// Statuses from which `self` can be reached in one transition.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[],
            Self::Dispatched => &[Self::Queued],
            Self::Success | Self::Failure => Self::ACTIVE,
        }
    }

    /// All possible status values.
    pub const ALL: &'static [JobStatus] =
        &[Self::Queued, Self::Dispatched, Self::Success, Self::Failure];

    /// Non-terminal statuses.
    pub const ACTIVE: &'static [JobStatus] = &[Self::Queued, Self::Dispatched];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            JobStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "dispatched" => Ok(Self::Dispatched),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}
