use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Capacity;
use crate::tasks::{Action, DockerResult, Runtime, RuntimeError, State, Task, TaskEvent};

/// Executes task events against a container runtime and keeps the resulting
/// task records.
///
/// The queue and the store are only touched between runtime calls, never
/// while one is in flight.
pub struct Worker {
    pub name: String,
    pub(crate) queue: Mutex<VecDeque<TaskEvent>>,
    pub(crate) db: Mutex<HashMap<Uuid, Task>>,
    pub(crate) capacity: Capacity,
    pub(crate) runtime: Arc<dyn Runtime>,
    pub(crate) runtime_timeout: Duration,
}

/// Free capacity a worker reports to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub task_count: u64,
    pub memory_available: u64,
    pub disk_available: u64,
    pub cpu_available: f64,
}

pub struct TaskServer {
    pub worker: Arc<Worker>,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition { task_id: Uuid, from: State, to: State },

    #[error("Worker cannot execute a transition to {state} for task {task_id}")]
    UnsupportedTransition { task_id: Uuid, state: State },

    #[error("Runtime {action} failed for task {task_id}: {source}")]
    Runtime {
        task_id: Uuid,
        action: Action,
        #[source]
        source: RuntimeError,
    },

    #[error("Task {0} has no container to stop")]
    MissingContainer(Uuid),
}

impl WorkerError {
    pub fn task_id(&self) -> Uuid {
        match self {
            WorkerError::InvalidTransition { task_id, .. }
            | WorkerError::UnsupportedTransition { task_id, .. }
            | WorkerError::Runtime { task_id, .. } => *task_id,
            WorkerError::MissingContainer(task_id) => *task_id,
        }
    }
}

impl From<&WorkerError> for DockerResult {
    fn from(err: &WorkerError) -> Self {
        let action = match err {
            WorkerError::Runtime { action, .. } => Some(*action),
            WorkerError::MissingContainer(_) => Some(Action::Stop),
            _ => None,
        };
        DockerResult::failure(Some(err.task_id()), action, err.to_string())
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
