use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::retry::calculate_backoff;
use common::{FailureReason, JobStatus, RetryDecision, WorkItem};
use mq::{AckHandle, Delivery};
use sea_orm::DatabaseConnection;
use store::{StoreError, UpdateOutcome, audit_store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::trigger::{TriggerRequest, WorkflowTrigger};

/// Pause after a failed dequeue before asking the queue again.
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Trigger acknowledged, record moved to `dispatched`, item acked.
    Dispatched,
    /// Trigger failed, item handed back to the queue for a later attempt.
    Retrying { attempt: u32, delay: Duration },
    /// Trigger failed for the last allowed time, record failed with `dispatch_exhausted`.
    Exhausted { attempts: u32 },
    /// Record had already left `queued`, item acked without a trigger call.
    Skipped { status: JobStatus },
    /// Item was unreadable or had no audit record, acked and dropped.
    Discarded,
}

/// Moves work items from the queue to the external workflow.
pub struct Dispatcher {
    db: DatabaseConnection,
    queue: Arc<mq::Mq>,
    trigger: Arc<dyn WorkflowTrigger>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        db: DatabaseConnection,
        queue: Arc<mq::Mq>,
        trigger: Arc<dyn WorkflowTrigger>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            queue,
            trigger,
            config,
        }
    }

    /// Dequeue and handle deliveries until `cancel` fires.
    ///
    /// A delivery already taken off the queue is always finished before the loop exits.
    pub async fn run(&self, loop_id: &str, cancel: CancellationToken) {
        let wait = Duration::from_millis(self.config.dequeue_wait_ms.max(1));
        info!(loop_id, "Dispatch loop started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.queue.dequeue(wait) => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    let message_id = delivery.handle.message_id.clone();
                    match self.handle(delivery).await {
                        Ok(outcome) => debug!(loop_id, message_id, ?outcome, "Delivery handled"),
                        Err(e) => error!(
                            loop_id,
                            message_id,
                            error = %e,
                            "Delivery left for redelivery"
                        ),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(loop_id, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(DEQUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(loop_id, "Dispatch loop stopped");
    }

    /// Handle one delivery.
    ///
    /// An `Err` means the audit store could not be reached. The item is then
    /// neither acked nor nacked and comes back after the visibility timeout.
    pub async fn handle(&self, delivery: Delivery) -> Result<DispatchOutcome> {
        let item: WorkItem = match delivery.decode() {
            Ok(item) => item,
            Err(e) => {
                error!(
                    message_id = %delivery.handle.message_id,
                    error = %e,
                    "Dropping malformed work item"
                );
                self.ack(&delivery.handle).await?;
                return Ok(DispatchOutcome::Discarded);
            }
        };
        let job_id = item.job_id;
        let store = &audit_store(&self.db);

        let record = self
            .with_store_retry(job_id, "load record", move || store.get(job_id))
            .await?;

        let Some(record) = record else {
            warn!(job_id = %job_id, "Dropping work item without audit record");
            self.ack(&delivery.handle).await?;
            return Ok(DispatchOutcome::Discarded);
        };

        if record.status != JobStatus::Queued {
            info!(
                job_id = %job_id,
                status = %record.status,
                delivery_count = delivery.handle.delivery_count,
                "Job already past queued, skipping delivery"
            );
            self.ack(&delivery.handle).await?;
            return Ok(DispatchOutcome::Skipped {
                status: record.status,
            });
        }

        // Attempts already used up, e.g. by a crash between the last failure and its ack.
        let attempts = u32::try_from(record.dispatch_attempts).unwrap_or(u32::MAX);
        if attempts >= self.config.retry.max_attempts {
            return self.exhaust(job_id, &delivery.handle, attempts).await;
        }

        let request = TriggerRequest::new(item, self.config.callback_url(job_id));

        match self.trigger.trigger(&request).await {
            Ok(()) => self.on_triggered(job_id, &delivery.handle).await,
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    attempts = record.dispatch_attempts + 1,
                    error = %e,
                    "Trigger call failed"
                );
                self.on_trigger_failed(job_id, &delivery.handle).await
            }
        }
    }

    async fn on_triggered(&self, job_id: Uuid, handle: &AckHandle) -> Result<DispatchOutcome> {
        let store = &audit_store(&self.db);
        let outcome = self
            .with_store_retry(job_id, "mark dispatched", move || {
                store.mark_dispatched(job_id)
            })
            .await?;

        let result = match outcome {
            UpdateOutcome::Applied(record) => {
                info!(
                    job_id = %job_id,
                    attempts = record.dispatch_attempts,
                    "Job dispatched"
                );
                DispatchOutcome::Dispatched
            }
            // A callback can land before the dispatch is recorded.
            UpdateOutcome::Rejected { current } => {
                info!(
                    job_id = %job_id,
                    status = %current.status,
                    "Job moved on while being dispatched"
                );
                DispatchOutcome::Skipped {
                    status: current.status,
                }
            }
            UpdateOutcome::NotFound => {
                warn!(job_id = %job_id, "Audit record vanished while dispatching");
                DispatchOutcome::Discarded
            }
        };

        self.ack(handle).await?;
        Ok(result)
    }

    async fn on_trigger_failed(&self, job_id: Uuid, handle: &AckHandle) -> Result<DispatchOutcome> {
        let store = &audit_store(&self.db);
        let outcome = self
            .with_store_retry(job_id, "record failed attempt", move || {
                store.record_failed_attempt(job_id)
            })
            .await?;

        let record = match outcome {
            UpdateOutcome::Applied(record) => record,
            UpdateOutcome::Rejected { current } => {
                self.ack(handle).await?;
                return Ok(DispatchOutcome::Skipped {
                    status: current.status,
                });
            }
            UpdateOutcome::NotFound => {
                self.ack(handle).await?;
                return Ok(DispatchOutcome::Discarded);
            }
        };

        let attempts = u32::try_from(record.dispatch_attempts).unwrap_or(u32::MAX);

        match self.config.retry.decide(attempts) {
            RetryDecision::Retry { attempt, delay } => {
                warn!(
                    job_id = %job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying dispatch"
                );
                if !self.queue.nack(handle, delay).await? {
                    debug!(job_id = %job_id, "Lease expired before nack");
                }
                Ok(DispatchOutcome::Retrying { attempt, delay })
            }
            RetryDecision::Exhausted { attempts } => self.exhaust(job_id, handle, attempts).await,
        }
    }

    /// Fail the job with `dispatch_exhausted` and drop its item.
    async fn exhaust(
        &self,
        job_id: Uuid,
        handle: &AckHandle,
        attempts: u32,
    ) -> Result<DispatchOutcome> {
        let store = &audit_store(&self.db);
        let failed = self
            .with_store_retry(job_id, "record dispatch exhaustion", move || {
                store.fail(job_id, JobStatus::Queued, FailureReason::DISPATCH_EXHAUSTED)
            })
            .await?;

        if failed.is_applied() {
            error!(job_id = %job_id, attempts, "Dispatch attempts exhausted, job failed");
        }
        self.ack(handle).await?;
        Ok(DispatchOutcome::Exhausted { attempts })
    }

    async fn ack(&self, handle: &AckHandle) -> Result<()> {
        if !self.queue.ack(handle).await? {
            debug!(message_id = %handle.message_id, "Lease expired before ack");
        }
        Ok(())
    }

    /// Run a store operation, retrying transient failures with backoff.
    async fn with_store_retry<T, F, Fut>(&self, job_id: Uuid, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.store_retry_attempts => {
                    let delay = calculate_backoff(
                        attempt,
                        self.config.store_retry_base_ms,
                        self.config.store_retry_base_ms * 16,
                    );
                    warn!(
                        job_id = %job_id,
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying audit store operation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
