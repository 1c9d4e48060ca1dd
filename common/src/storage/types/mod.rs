pub mod job;
pub mod upload;
