pub mod job_repo;

pub use job_repo::{JobRecord, JobRepository, JobStats, StatusStoreError};
