use chrono::{DateTime, Utc};
use common::{FailureReason, JobStatus};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionSession,
    TransactionTrait,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::entity::{job_payload, job_record};
use crate::error::StoreError;

/// Fields supplied when a job is first recorded.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: Uuid,
    pub source_name: String,
    pub target_identifier: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

/// A conditional change to one record.
///
/// The write only happens while the record's current status is one of the
/// expected statuses. Terminal records can never be the source of an update.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    from: Vec<JobStatus>,
    status: Option<JobStatus>,
    bump_attempts: bool,
    result_message: Option<String>,
    result_reference: Option<String>,
}

impl JobUpdate {
    /// Move the record to `next` from any status allowed to precede it.
    pub fn transition(next: JobStatus) -> Self {
        Self {
            from: next.predecessors().to_vec(),
            status: Some(next),
            bump_attempts: false,
            result_message: None,
            result_reference: None,
        }
    }

    /// Keep the status, but only while it is still `current`.
    pub fn in_place(current: JobStatus) -> Self {
        Self {
            from: vec![current],
            status: None,
            bump_attempts: false,
            result_message: None,
            result_reference: None,
        }
    }

    /// Narrow the accepted source statuses to just `status`.
    pub fn only_from(mut self, status: JobStatus) -> Self {
        self.from.retain(|s| *s == status);
        self
    }

    pub fn bump_attempts(mut self) -> Self {
        self.bump_attempts = true;
        self
    }

    pub fn result(mut self, message: Option<String>, reference: Option<String>) -> Self {
        self.result_message = message;
        self.result_reference = reference;
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.from.is_empty() {
            return Err(StoreError::InvalidUpdate(
                "no status is allowed to precede this update".into(),
            ));
        }

        match self.status {
            Some(next) => {
                if let Some(bad) = self.from.iter().find(|s| !s.can_transition(next)) {
                    return Err(StoreError::InvalidUpdate(format!(
                        "transition {bad} -> {next} is not allowed"
                    )));
                }
            }
            None => {
                if self.from.iter().any(JobStatus::is_terminal) {
                    return Err(StoreError::InvalidUpdate(
                        "terminal records cannot be modified".into(),
                    ));
                }
            }
        }

        let has_result = self.result_message.is_some() || self.result_reference.is_some();
        if has_result && !self.status.is_some_and(|s| s.is_terminal()) {
            return Err(StoreError::InvalidUpdate(
                "results are only recorded on a terminal transition".into(),
            ));
        }

        Ok(())
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was written; carries the record as it is now.
    Applied(job_record::Model),
    /// The record's status did not allow the update. Nothing was written.
    Rejected { current: job_record::Model },
    NotFound,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub dispatched: u64,
    pub success: u64,
    pub failure: u64,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Dispatched => self.dispatched,
            JobStatus::Success => self.success,
            JobStatus::Failure => self.failure,
        }
    }

    fn set(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Queued => self.queued = count,
            JobStatus::Dispatched => self.dispatched = count,
            JobStatus::Success => self.success = count,
            JobStatus::Failure => self.failure = count,
        }
    }

    pub fn total(&self) -> u64 {
        self.queued + self.dispatched + self.success + self.failure
    }
}

pub struct AuditStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> AuditStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a new record in `queued` together with its payload.
    ///
    /// This is the only insert a job ever gets.
    pub async fn create(&self, job: NewJob) -> Result<job_record::Model, StoreError> {
        let now = Utc::now();
        let payload = job_payload::ActiveModel {
            job_id: Set(job.job_id),
            size: Set(job.payload.len() as i64),
            content: Set(job.payload),
            created_at: Set(now),
        };
        let model = job_record::ActiveModel {
            job_id: Set(job.job_id),
            status: Set(JobStatus::Queued),
            source_name: Set(job.source_name),
            target_identifier: Set(job.target_identifier),
            content_type: Set(job.content_type),
            created_at: Set(now),
            updated_at: Set(now),
            dispatched_at: Set(None),
            dispatch_attempts: Set(0),
            completed_at: Set(None),
            result_message: Set(None),
            result_reference: Set(None),
        };

        let txn = self.conn.begin().await?;

        let inserted = match model.insert(&txn).await {
            Ok(inserted) => inserted,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(StoreError::Duplicate(job.job_id));
            }
            Err(e) => return Err(e.into()),
        };
        payload.insert(&txn).await?;

        txn.commit().await?;
        Ok(inserted)
    }

    /// Uploaded bytes of a job that has not reached a terminal status yet.
    pub async fn payload(&self, job_id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(job_payload::Entity::find_by_id(job_id)
            .one(self.conn)
            .await?
            .map(|p| p.content))
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<job_record::Model>, StoreError> {
        Ok(job_record::Entity::find_by_id(job_id).one(self.conn).await?)
    }

    /// Apply `update` as a single compare-and-set on the current status.
    pub async fn update(
        &self,
        job_id: Uuid,
        update: JobUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        update.validate()?;

        let now = Utc::now();
        let txn = self.conn.begin().await?;

        let mut stmt = job_record::Entity::update_many()
            .col_expr(job_record::Column::UpdatedAt, Expr::value(now));

        if let Some(next) = update.status {
            stmt = stmt.col_expr(job_record::Column::Status, Expr::value(next));

            if next == JobStatus::Dispatched {
                stmt = stmt.col_expr(job_record::Column::DispatchedAt, Expr::value(Some(now)));
            }

            if next.is_terminal() {
                stmt = stmt
                    .col_expr(job_record::Column::CompletedAt, Expr::value(Some(now)))
                    .col_expr(
                        job_record::Column::ResultMessage,
                        Expr::value(update.result_message.clone()),
                    )
                    .col_expr(
                        job_record::Column::ResultReference,
                        Expr::value(update.result_reference.clone()),
                    );
            }
        }

        if update.bump_attempts {
            stmt = stmt.col_expr(
                job_record::Column::DispatchAttempts,
                Expr::col(job_record::Column::DispatchAttempts).add(1),
            );
        }

        let result = stmt
            .filter(job_record::Column::JobId.eq(job_id))
            .filter(job_record::Column::Status.is_in(update.from.clone()))
            .exec(&txn)
            .await?;

        let record = job_record::Entity::find_by_id(job_id).one(&txn).await?;

        if result.rows_affected > 0 && update.status.is_some_and(|s| s.is_terminal()) {
            job_payload::Entity::delete_by_id(job_id).exec(&txn).await?;
        }

        txn.commit().await?;

        let outcome = match (result.rows_affected, record) {
            (_, None) => UpdateOutcome::NotFound,
            (0, Some(current)) => {
                debug!(
                    job_id = %job_id,
                    current = %current.status,
                    target = ?update.status,
                    "Update rejected by current status"
                );
                UpdateOutcome::Rejected { current }
            }
            (_, Some(record)) => UpdateOutcome::Applied(record),
        };

        Ok(outcome)
    }

    /// `queued -> dispatched`, counting the successful attempt.
    pub async fn mark_dispatched(&self, job_id: Uuid) -> Result<UpdateOutcome, StoreError> {
        self.update(job_id, JobUpdate::transition(JobStatus::Dispatched).bump_attempts())
            .await
    }

    /// Count a failed dispatch attempt on a record that is still `queued`.
    pub async fn record_failed_attempt(&self, job_id: Uuid) -> Result<UpdateOutcome, StoreError> {
        self.update(job_id, JobUpdate::in_place(JobStatus::Queued).bump_attempts())
            .await
    }

    /// Record a terminal outcome. Already-terminal records are left untouched.
    pub async fn complete(
        &self,
        job_id: Uuid,
        status: JobStatus,
        message: Option<String>,
        reference: Option<String>,
    ) -> Result<UpdateOutcome, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidUpdate(format!(
                "{status} is not a terminal status"
            )));
        }

        self.update(job_id, JobUpdate::transition(status).result(message, reference))
            .await
    }

    /// Fail a record that is still in `from`, recording an engine-side reason.
    pub async fn fail(
        &self,
        job_id: Uuid,
        from: JobStatus,
        reason: &str,
    ) -> Result<UpdateOutcome, StoreError> {
        let update = JobUpdate::transition(JobStatus::Failure)
            .only_from(from)
            .result(Some(reason.to_string()), None);
        self.update(job_id, update).await
    }

    /// Bump `updated_at` on a record that is still `queued`.
    pub async fn touch_queued(&self, job_id: Uuid) -> Result<UpdateOutcome, StoreError> {
        self.update(job_id, JobUpdate::in_place(JobStatus::Queued))
            .await
    }

    /// Most recent records in `status`.
    pub async fn list_by_status(
        &self,
        status: JobStatus,
        limit: u64,
    ) -> Result<Vec<job_record::Model>, StoreError> {
        Ok(job_record::Entity::find()
            .filter(job_record::Column::Status.eq(status))
            .order_by_desc(job_record::Column::CreatedAt)
            .limit(limit)
            .all(self.conn)
            .await?)
    }

    pub async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();

        for &status in JobStatus::ALL {
            let count = job_record::Entity::find()
                .filter(job_record::Column::Status.eq(status))
                .count(self.conn)
                .await?;
            counts.set(status, count);
        }

        Ok(counts)
    }

    /// Failed records carrying an engine-side reason, newest first.
    ///
    /// With `reason = None` every reserved reason matches.
    pub async fn list_failures(
        &self,
        reason: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<job_record::Model>, u64), StoreError> {
        let mut query =
            job_record::Entity::find().filter(job_record::Column::Status.eq(JobStatus::Failure));

        query = match reason {
            Some(reason) => query.filter(job_record::Column::ResultMessage.eq(reason)),
            None => query.filter(
                job_record::Column::ResultMessage.is_in(FailureReason::ALL.iter().copied()),
            ),
        };

        let total = query.clone().count(self.conn).await?;

        let offset = page.saturating_sub(1).saturating_mul(per_page);
        if offset >= total {
            return Ok((Vec::new(), total));
        }

        let records = query
            .order_by_desc(job_record::Column::CompletedAt)
            .offset(offset)
            .limit(per_page)
            .all(self.conn)
            .await?;

        Ok((records, total))
    }

    /// `queued` records not written since `updated_before`, oldest first.
    pub async fn stale_queued(
        &self,
        updated_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<job_record::Model>, StoreError> {
        Ok(job_record::Entity::find()
            .filter(job_record::Column::Status.eq(JobStatus::Queued))
            .filter(job_record::Column::UpdatedAt.lt(updated_before))
            .order_by_asc(job_record::Column::UpdatedAt)
            .limit(limit)
            .all(self.conn)
            .await?)
    }

    /// `dispatched` records handed off before `dispatched_before`, oldest first.
    pub async fn stale_dispatched(
        &self,
        dispatched_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<job_record::Model>, StoreError> {
        Ok(job_record::Entity::find()
            .filter(job_record::Column::Status.eq(JobStatus::Dispatched))
            .filter(job_record::Column::DispatchedAt.lt(dispatched_before))
            .order_by_asc(job_record::Column::DispatchedAt)
            .limit(limit)
            .all(self.conn)
            .await?)
    }
}

/// Create an AuditStore with a DatabaseConnection.
pub fn audit_store(db: &DatabaseConnection) -> AuditStore<'_, DatabaseConnection> {
    AuditStore::new(db)
}
