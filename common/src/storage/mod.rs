pub mod corpus;
pub mod jobs;
pub mod staging;
pub mod types;
