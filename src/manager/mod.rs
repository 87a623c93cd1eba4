pub mod api;
pub mod client;
pub mod manager;
pub mod types;

pub use client::{HttpWorker, LocalWorker, WorkerClient};
pub use manager::{run_reconciler, run_scheduler};
pub use types::{
    Assignment, Manager, ManagerError, ManagerResult, ManagerServer, ReconcileSummary,
    WorkerRecord,
};
