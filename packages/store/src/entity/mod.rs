pub mod job_payload;
pub mod job_record;
