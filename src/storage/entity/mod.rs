pub mod summary_job;
