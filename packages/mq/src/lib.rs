pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod redis_queue;

pub use config::MqConfig;
pub use error::MqError;
pub use memory::MemoryQueue;
pub use models::{AckHandle, Delivery, DurableQueue, QueueDepth, publish};
pub use redis_queue::RedisQueue;

pub type Mq = dyn DurableQueue;

/// Connect to the Redis-backed queue described by `config`.
pub async fn init_mq(config: MqConfig) -> Result<RedisQueue, MqError> {
    RedisQueue::connect(config).await
}
