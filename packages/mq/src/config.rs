use std::time::Duration;

use common::config::MqAppConfig;

/// Connection settings for a single queue.
#[derive(Debug, Clone)]
pub struct MqConfig {
    pub url: String,
    pub queue_name: String,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&MqAppConfig> for MqConfig {
    fn from(app: &MqAppConfig) -> Self {
        Self {
            url: app.url.clone(),
            queue_name: app.queue_name.clone(),
            visibility_timeout: Duration::from_secs(app.visibility_timeout_secs),
            poll_interval: Duration::from_millis(app.poll_interval_ms.max(1)),
        }
    }
}
