pub mod audit;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;

pub use audit::{AuditStore, JobUpdate, NewJob, StatusCounts, UpdateOutcome, audit_store};
pub use config::DatabaseConfig;
pub use database::init_db;
pub use entity::job_record::Model as JobRecord;
pub use error::StoreError;
