pub mod callback;
pub mod config;
pub mod failure;
pub mod job_status;
pub mod mq;
pub mod retry;
pub mod work_item;

pub use callback::{CALLBACK_TOKEN_HEADER, CallbackReport};
pub use config::MqAppConfig;
pub use failure::FailureReason;
pub use job_status::{JobStatus, ParseStatusError};
pub use retry::{RetryDecision, RetryPolicy};
pub use work_item::WorkItem;
