pub mod job_id;
pub mod model;
pub mod runner;
pub mod service;
pub mod watcher;

pub use runner::SummaryRunner;
pub use service::DispatchService;
pub use watcher::DirectoryWatcher;
