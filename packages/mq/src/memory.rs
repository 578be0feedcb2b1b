use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::mq::MessageEnvelope;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::MqError;
use crate::models::{AckHandle, Delivery, DurableQueue, QueueDepth};

#[derive(Debug)]
struct Entry {
    envelope: MessageEnvelope,
    visible_at: Instant,
    lease: Option<String>,
    deliveries: u32,
}

/// In-process queue with the same visibility-timeout semantics as [`crate::RedisQueue`].
///
/// Nothing survives a restart; used for tests and local development.
#[derive(Debug)]
pub struct MemoryQueue {
    entries: Mutex<HashMap<String, Entry>>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    /// Number of items held, visible or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Claim the earliest visible item, or report when the next one becomes visible.
    async fn claim(&self) -> Result<Option<Delivery>, Option<Instant>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let next = entries
            .iter()
            .min_by_key(|(_, entry)| entry.visible_at)
            .map(|(id, entry)| (id.clone(), entry.visible_at));

        match next {
            Some((id, visible_at)) if visible_at <= now => {
                let Some(entry) = entries.get_mut(&id) else {
                    return Err(None);
                };
                let lease = Uuid::new_v4().to_string();
                entry.visible_at = now + self.visibility_timeout;
                entry.lease = Some(lease.clone());
                entry.deliveries += 1;

                Ok(Some(Delivery {
                    envelope: entry.envelope.clone(),
                    handle: AckHandle {
                        message_id: id,
                        lease,
                        delivery_count: entry.deliveries,
                    },
                }))
            }
            Some((_, visible_at)) => Err(Some(visible_at)),
            None => Err(None),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn enqueue(&self, envelope: MessageEnvelope, delay: Duration) -> Result<(), MqError> {
        {
            let mut entries = self.entries.lock().await;
            entries
                .entry(envelope.message_id.clone())
                .or_insert_with(|| Entry {
                    envelope,
                    visible_at: Instant::now() + delay,
                    lease: None,
                    deliveries: 0,
                });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, MqError> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = match self.claim().await {
                Ok(delivery) => return Ok(delivery),
                Err(next_visible) => next_visible.map_or(deadline, |at| at.min(deadline)),
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn ack(&self, handle: &AckHandle) -> Result<bool, MqError> {
        let mut entries = self.entries.lock().await;
        let current = entries
            .get(&handle.message_id)
            .is_some_and(|entry| entry.lease.as_deref() == Some(handle.lease.as_str()));

        if current {
            entries.remove(&handle.message_id);
        }
        Ok(current)
    }

    async fn nack(&self, handle: &AckHandle, delay: Duration) -> Result<bool, MqError> {
        let released = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(&handle.message_id) {
                Some(entry) if entry.lease.as_deref() == Some(handle.lease.as_str()) => {
                    entry.lease = None;
                    entry.visible_at = Instant::now() + delay;
                    true
                }
                _ => false,
            }
        };

        if released {
            self.notify.notify_waiters();
        }
        Ok(released)
    }

    async fn depth(&self) -> Result<QueueDepth, MqError> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let ready = entries.values().filter(|e| e.visible_at <= now).count() as u64;

        Ok(QueueDepth {
            ready,
            pending: entries.len() as u64 - ready,
        })
    }
}
