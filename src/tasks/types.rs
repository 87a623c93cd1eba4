use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    /// Completed and Failed tasks never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => write!(f, "pending"),
            State::Scheduled => write!(f, "scheduled"),
            State::Running => write!(f, "running"),
            State::Completed => write!(f, "completed"),
            State::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

/// A unit of work destined to run as a container.
///
/// `memory` is expressed in MiB, `disk` in GiB and `cpu` as a fraction of
/// one core. `container_id` stays `None` until a worker has started the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub container_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub state: State,
    pub image: String,
    #[serde(default)]
    pub memory: u64,
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    #[serde(default)]
    pub port_bindings: HashMap<String, String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            container_id: None,
            name: name.into(),
            state: State::Pending,
            image: image.into(),
            memory: 0,
            disk: 0,
            cpu: None,
            exposed_ports: Vec::new(),
            port_bindings: HashMap::new(),
            env: Vec::new(),
            restart_policy: RestartPolicy::No,
            start_time: None,
            finish_time: None,
            error: None,
        }
    }

    pub fn with_memory(mut self, memory: u64) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_disk(mut self, disk: u64) -> Self {
        self.disk = disk;
        self
    }

    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.exposed_ports = ports.into_iter().collect();
        self
    }

    pub fn with_env(mut self, env: impl IntoIterator<Item = String>) -> Self {
        self.env = env.into_iter().collect();
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }
}

/// Request to move one task to `state`. The event is what travels from the
/// manager to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

/// Everything the runtime needs to launch one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub cpu: f64,
    /// Memory ceiling in bytes, 0 for unlimited.
    pub memory: i64,
    pub env: Vec<String>,
    pub exposed_ports: Vec<u16>,
    pub port_bindings: HashMap<String, String>,
    pub restart_policy: RestartPolicy,
}

impl From<&Task> for ContainerConfig {
    fn from(task: &Task) -> Self {
        ContainerConfig {
            name: format!("cube-{}", task.id),
            image: task.image.clone(),
            cpu: task.cpu.unwrap_or(0.0),
            memory: (task.memory.saturating_mul(1024 * 1024)).min(i64::MAX as u64) as i64,
            env: task.env.clone(),
            exposed_ports: task.exposed_ports.clone(),
            port_bindings: task.port_bindings.clone(),
            restart_policy: task.restart_policy,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Start,
    Stop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => write!(f, "start"),
            Action::Stop => write!(f, "stop"),
        }
    }
}

/// Outcome record of one executed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerResult {
    pub task_id: Option<Uuid>,
    pub action: Option<Action>,
    pub container_id: Option<String>,
    pub error: Option<String>,
}

impl DockerResult {
    pub fn success(task_id: Uuid, action: Action, container_id: Option<String>) -> Self {
        DockerResult {
            task_id: Some(task_id),
            action: Some(action),
            container_id,
            error: None,
        }
    }

    pub fn failure(task_id: Option<Uuid>, action: Option<Action>, message: String) -> Self {
        DockerResult {
            task_id,
            action,
            container_id: None,
            error: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runtime failures are opaque to the worker beyond their message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Failed(String),

    #[error("runtime call timed out after {0:?}")]
    Timeout(Duration),
}
