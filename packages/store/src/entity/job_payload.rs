use sea_orm::entity::prelude::*;

/// Uploaded bytes of a job, kept until the job reaches a terminal status so
/// the reconciler can enqueue it again.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_payload")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub job_id: Uuid,

    pub content: Vec<u8>,

    pub size: i64,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
