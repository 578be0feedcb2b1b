use common::JobStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit record of one job, from submission to its terminal outcome.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_record")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_id: Uuid,

    #[sea_orm(indexed)]
    pub status: JobStatus,

    /// Descriptive label supplied at submission, usually the uploaded filename.
    pub source_name: String,

    /// Destination the external workflow should act on. Opaque to the engine.
    pub target_identifier: String,

    pub content_type: Option<String>,

    pub created_at: DateTimeUtc,

    /// Touched by every write, including requeues by the reconciler.
    #[sea_orm(indexed)]
    pub updated_at: DateTimeUtc,

    /// Set on the `queued -> dispatched` edge.
    pub dispatched_at: Option<DateTimeUtc>,

    #[sea_orm(default_value = 0)]
    pub dispatch_attempts: i32,

    /// Non-null exactly when `status` is terminal.
    pub completed_at: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Text", nullable)]
    pub result_message: Option<String>,

    pub result_reference: Option<String>,
}

impl ActiveModelBehavior for ActiveModel {}
