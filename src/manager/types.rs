use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::client::WorkerClient;
use crate::scheduler::Scheduler;
use crate::tasks::{State, Task, TaskEvent};
use crate::worker::WorkerStats;

/// Manager's cached view of one worker.
pub struct WorkerRecord {
    pub client: Arc<dyn WorkerClient>,
    pub stats: Option<WorkerStats>,
    pub last_seen: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(client: Arc<dyn WorkerClient>) -> Self {
        Self {
            client,
            stats: None,
            last_seen: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }
}

/// Cluster-wide task and event history, keyed by owning worker.
#[derive(Debug, Default)]
pub(crate) struct ClusterStore {
    pub(crate) tasks: HashMap<String, Vec<Task>>,
    pub(crate) events: HashMap<String, Vec<TaskEvent>>,
    pub(crate) owners: HashMap<Uuid, String>,
}

pub struct Manager {
    pub(crate) pending: Mutex<VecDeque<Task>>,
    pub(crate) store: Mutex<ClusterStore>,
    pub(crate) workers: Mutex<Vec<WorkerRecord>>,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) grace_period: Duration,
}

pub struct ManagerServer {
    pub manager: Arc<Manager>,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub task_id: Uuid,
    pub worker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Synthetic events recorded for observed state changes.
    pub updated: usize,
    pub unreachable: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    #[error("No worker can fit task {0}")]
    NoFeasibleWorker(Uuid),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition { task_id: Uuid, from: State, to: State },

    #[error("Worker communication failed: {0}")]
    WorkerCommunication(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
