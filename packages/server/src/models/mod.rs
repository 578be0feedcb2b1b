pub mod job;
pub mod monitoring;
pub mod shared;
