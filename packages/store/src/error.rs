use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    Duplicate(Uuid),

    /// The requested change would break the job state machine. Nothing was written.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

impl StoreError {
    /// Errors worth retrying: the database was unreachable or the pool was exhausted.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Db(DbErr::ConnectionAcquire(_) | DbErr::Conn(_))
        )
    }
}
