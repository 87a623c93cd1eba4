pub mod api;
pub mod stats;
pub mod types;
pub mod worker;

pub use types::{TaskServer, Worker, WorkerError, WorkerResult, WorkerStats};
pub use worker::run_tasks;
