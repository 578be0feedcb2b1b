pub mod callback;
pub mod submission;
