use serde::Deserialize;

/// App-level MQ configuration shared by the server and the worker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Queue carrying work items from the server to dispatch workers. Default: "relay_jobs".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// Seconds a dequeued item stays invisible before it is redelivered. Default: 300.
    #[serde(default = "default_mq_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    /// How often an idle consumer polls for visible items. Default: 500.
    #[serde(default = "default_mq_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_queue_name() -> String {
    "relay_jobs".into()
}
fn default_mq_visibility_timeout_secs() -> u64 {
    300
}
fn default_mq_poll_interval_ms() -> u64 {
    500
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            queue_name: default_mq_queue_name(),
            visibility_timeout_secs: default_mq_visibility_timeout_secs(),
            poll_interval_ms: default_mq_poll_interval_ms(),
        }
    }
}
