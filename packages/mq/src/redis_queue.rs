use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::mq::MessageEnvelope;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MqConfig;
use crate::error::MqError;
use crate::models::{AckHandle, Delivery, DurableQueue, QueueDepth};

// KEYS: ready, payloads. ARGV: id, payload, visible_at_ms
static ENQUEUE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
return redis.call('ZADD', KEYS[1], 'NX', ARGV[3], ARGV[1])
",
    )
});

// KEYS: ready, payloads, leases, deliveries. ARGV: now_ms, visibility_ms, lease
static DEQUEUE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
  return false
end
local id = ids[1]
local payload = redis.call('HGET', KEYS[2], id)
if not payload then
  redis.call('ZREM', KEYS[1], id)
  return false
end
redis.call('ZADD', KEYS[1], tonumber(ARGV[1]) + tonumber(ARGV[2]), id)
redis.call('HSET', KEYS[3], id, ARGV[3])
local count = redis.call('HINCRBY', KEYS[4], id, 1)
return {id, payload, count}
",
    )
});

// KEYS: ready, payloads, leases, deliveries. ARGV: id, lease
static ACK: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[3], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
return 1
",
    )
});

// KEYS: ready, leases. ARGV: id, lease, visible_at_ms
static NACK: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZADD', KEYS[1], 'XX', ARGV[3], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
return 1
",
    )
});

/// Redis key layout for one queue. The `{name}` hash tag keeps all keys in one cluster slot.
#[derive(Debug, Clone)]
struct QueueKeys {
    /// Sorted set of message ids scored by the time they become visible.
    ready: String,
    /// Hash of message id -> serialized envelope.
    payloads: String,
    /// Hash of message id -> lease of the current delivery.
    leases: String,
    /// Hash of message id -> delivery count.
    deliveries: String,
}

impl QueueKeys {
    fn new(queue_name: &str) -> Self {
        Self {
            ready: format!("{{{queue_name}}}:ready"),
            payloads: format!("{{{queue_name}}}:payloads"),
            leases: format!("{{{queue_name}}}:leases"),
            deliveries: format!("{{{queue_name}}}:deliveries"),
        }
    }
}

/// Durable queue stored in Redis.
///
/// Visibility is tracked as the score of each id in a sorted set, so an item
/// whose consumer disappeared becomes visible again without any sweeper.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
    keys: QueueKeys,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl RedisQueue {
    pub async fn connect(config: MqConfig) -> Result<Self, MqError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(
            queue = %config.queue_name,
            visibility_timeout_secs = config.visibility_timeout.as_secs(),
            "Connected to Redis queue"
        );

        Ok(Self {
            conn,
            keys: QueueKeys::new(&config.queue_name),
            visibility_timeout: config.visibility_timeout,
            poll_interval: config.poll_interval,
        })
    }

    async fn try_dequeue(&self) -> Result<Option<Delivery>, MqError> {
        let mut conn = self.conn.clone();
        let lease = Uuid::new_v4().to_string();

        let claimed: Option<(String, String, u32)> = DEQUEUE
            .key(&self.keys.ready)
            .key(&self.keys.payloads)
            .key(&self.keys.leases)
            .key(&self.keys.deliveries)
            .arg(now_ms())
            .arg(self.visibility_timeout.as_millis() as i64)
            .arg(&lease)
            .invoke_async(&mut conn)
            .await?;

        let Some((message_id, raw, delivery_count)) = claimed else {
            return Ok(None);
        };

        let envelope: MessageEnvelope = serde_json::from_str(&raw)?;

        debug!(message_id = %message_id, delivery_count, "Claimed queue item");

        Ok(Some(Delivery {
            envelope,
            handle: AckHandle {
                message_id,
                lease,
                delivery_count,
            },
        }))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl DurableQueue for RedisQueue {
    async fn enqueue(&self, envelope: MessageEnvelope, delay: Duration) -> Result<(), MqError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&envelope)?;
        let visible_at = now_ms() + delay.as_millis() as i64;

        let added: i64 = ENQUEUE
            .key(&self.keys.ready)
            .key(&self.keys.payloads)
            .arg(&envelope.message_id)
            .arg(raw)
            .arg(visible_at)
            .invoke_async(&mut conn)
            .await?;

        if added == 0 {
            debug!(message_id = %envelope.message_id, "Item already queued, keeping existing schedule");
        }

        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, MqError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(delivery) = self.try_dequeue().await? {
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn ack(&self, handle: &AckHandle) -> Result<bool, MqError> {
        let mut conn = self.conn.clone();

        let removed: i64 = ACK
            .key(&self.keys.ready)
            .key(&self.keys.payloads)
            .key(&self.keys.leases)
            .key(&self.keys.deliveries)
            .arg(&handle.message_id)
            .arg(&handle.lease)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!(message_id = %handle.message_id, "Ack ignored, lease is no longer current");
        }

        Ok(removed == 1)
    }

    async fn nack(&self, handle: &AckHandle, delay: Duration) -> Result<bool, MqError> {
        let mut conn = self.conn.clone();
        let visible_at = now_ms() + delay.as_millis() as i64;

        let released: i64 = NACK
            .key(&self.keys.ready)
            .key(&self.keys.leases)
            .arg(&handle.message_id)
            .arg(&handle.lease)
            .arg(visible_at)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            warn!(message_id = %handle.message_id, "Nack ignored, lease is no longer current");
        }

        Ok(released == 1)
    }

    async fn depth(&self) -> Result<QueueDepth, MqError> {
        let mut conn = self.conn.clone();

        let (ready, total): (u64, u64) = redis::pipe()
            .cmd("ZCOUNT")
            .arg(&self.keys.ready)
            .arg("-inf")
            .arg(now_ms())
            .cmd("ZCARD")
            .arg(&self.keys.ready)
            .query_async(&mut conn)
            .await?;

        Ok(QueueDepth {
            ready,
            pending: total.saturating_sub(ready),
        })
    }
}
