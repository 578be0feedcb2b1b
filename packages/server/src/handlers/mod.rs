pub mod callback;
pub mod health;
pub mod jobs;
pub mod monitoring;
