use std::time::Duration;

use async_trait::async_trait;
use common::mq::{Message, MessageEnvelope, MessageError};
use serde::Serialize;

use crate::error::MqError;

/// Receipt for one delivery of a queued item.
///
/// `lease` is unique per delivery. Once the item has been redelivered after a
/// visibility timeout, acks and nacks carrying an older lease are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    pub message_id: String,
    pub lease: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

/// An item handed to a consumer together with its ack handle.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: MessageEnvelope,
    pub handle: AckHandle,
}

impl Delivery {
    pub fn decode<M: Message>(&self) -> Result<M, MessageError> {
        self.envelope.clone().into_message()
    }
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Items visible to consumers right now.
    pub ready: u64,
    /// Items that are in flight or scheduled for a later retry.
    pub pending: u64,
}

impl QueueDepth {
    pub fn total(&self) -> u64 {
        self.ready + self.pending
    }
}

/// At-least-once work queue.
///
/// A dequeued item stays invisible for the visibility timeout. If it is
/// neither acked nor nacked in that window it becomes visible again, which
/// also covers consumers that crashed mid-delivery.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Add an item, visible after `delay`. Enqueueing an id that is already
    /// present leaves the existing item (and its schedule) untouched.
    async fn enqueue(&self, envelope: MessageEnvelope, delay: Duration) -> Result<(), MqError>;

    /// Wait up to `wait` for a visible item.
    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, MqError>;

    /// Remove the item for good. Returns false if the lease is no longer current.
    async fn ack(&self, handle: &AckHandle) -> Result<bool, MqError>;

    /// Give the item back, visible again after `delay`. Returns false if the lease is no longer current.
    async fn nack(&self, handle: &AckHandle, delay: Duration) -> Result<bool, MqError>;

    async fn depth(&self) -> Result<QueueDepth, MqError>;
}

/// Wrap `message` in an envelope and enqueue it for immediate delivery.
pub async fn publish<Q, M>(queue: &Q, message: &M) -> Result<(), MqError>
where
    Q: DurableQueue + ?Sized,
    M: Message,
{
    let envelope = MessageEnvelope::from_message(message)?;
    queue.enqueue(envelope, Duration::ZERO).await
}
