use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use uuid::Uuid;

use super::types::{Worker, WorkerError, WorkerResult};
use crate::config::{Capacity, Config};
use crate::tasks::{
    Action, ContainerConfig, DockerResult, Runtime, RuntimeError, State, Task, TaskEvent,
    valid_state_transition,
};

impl Worker {
    pub fn new(
        name: impl Into<String>,
        capacity: Capacity,
        runtime: Arc<dyn Runtime>,
        runtime_timeout: Duration,
    ) -> Self {
        Worker {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            db: Mutex::new(HashMap::new()),
            capacity,
            runtime,
            runtime_timeout,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &Config, runtime: Arc<dyn Runtime>) -> Self {
        Self::new(name, config.capacity, runtime, config.runtime_timeout)
    }

    /// Queue an event for execution. Validation is deferred until the event
    /// runs, against whatever state is persisted at that point.
    pub async fn enqueue(&self, event: TaskEvent) {
        tracing::debug!(worker = %self.name, task_id = %event.task.id, state = %event.state, "Event queued");
        self.queue.lock().await.push_back(event);
    }

    /// Execute the oldest queued event. `Ok(None)` means the queue was empty.
    pub async fn run_pending_event(&self) -> WorkerResult<Option<DockerResult>> {
        let Some(event) = self.queue.lock().await.pop_front() else {
            return Ok(None);
        };
        let task_id = event.task.id;

        let persisted = {
            let mut db = self.db.lock().await;
            db.entry(task_id)
                .or_insert_with(|| event.task.clone())
                .clone()
        };

        if !valid_state_transition(persisted.state, event.state) {
            tracing::warn!(
                worker = %self.name,
                task_id = %task_id,
                from = %persisted.state,
                to = %event.state,
                "Rejecting invalid state transition"
            );
            return Err(WorkerError::InvalidTransition {
                task_id,
                from: persisted.state,
                to: event.state,
            });
        }

        match event.state {
            State::Scheduled => self.start_task(persisted).await.map(Some),
            State::Completed => self.stop_task(persisted).await.map(Some),
            state => Err(WorkerError::UnsupportedTransition { task_id, state }),
        }
    }

    async fn start_task(&self, mut task: Task) -> WorkerResult<DockerResult> {
        let config = ContainerConfig::from(&task);
        tracing::info!(worker = %self.name, task_id = %task.id, image = %task.image, "Starting task");

        let outcome = match timeout(self.runtime_timeout, self.runtime.start(&config)).await {
            Ok(Ok(container_id)) if container_id.is_empty() => Err(RuntimeError::Failed(
                "runtime returned an empty container id".to_string(),
            )),
            Ok(outcome) => outcome,
            Err(_) => Err(RuntimeError::Timeout(self.runtime_timeout)),
        };

        match outcome {
            Ok(container_id) => {
                task.container_id = Some(container_id.clone());
                task.state = State::Running;
                task.start_time = Some(Utc::now());
                task.error = None;
                tracing::info!(task_id = %task.id, container_id = %container_id, "Task running");
                self.db.lock().await.insert(task.id, task.clone());

                Ok(DockerResult::success(task.id, Action::Start, Some(container_id)))
            }
            Err(err) => {
                tracing::error!(task_id = %task.id, error = %err, "Error running task");
                task.state = State::Failed;
                task.finish_time = Some(Utc::now());
                task.error = Some(err.to_string());
                self.db.lock().await.insert(task.id, task.clone());

                Err(WorkerError::Runtime {
                    task_id: task.id,
                    action: Action::Start,
                    source: err,
                })
            }
        }
    }

    async fn stop_task(&self, mut task: Task) -> WorkerResult<DockerResult> {
        let Some(container_id) = task.container_id.clone() else {
            return Err(WorkerError::MissingContainer(task.id));
        };

        let outcome = match timeout(self.runtime_timeout, self.runtime.stop(&container_id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RuntimeError::Timeout(self.runtime_timeout)),
        };

        match outcome {
            Ok(()) => {
                task.state = State::Completed;
                task.finish_time = Some(Utc::now());
                tracing::info!(task_id = %task.id, container_id = %container_id, "Stopped and removed task");
                self.db.lock().await.insert(task.id, task.clone());

                Ok(DockerResult::success(task.id, Action::Stop, Some(container_id)))
            }
            Err(err) => {
                // The task stays Running until a later stop succeeds.
                tracing::warn!(task_id = %task.id, container_id = %container_id, error = %err, "Error stopping task");
                Err(WorkerError::Runtime {
                    task_id: task.id,
                    action: Action::Stop,
                    source: err,
                })
            }
        }
    }

    pub async fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.db.lock().await.values().cloned().collect();
        tasks.sort_by_key(|task| task.start_time);
        tasks
    }

    pub async fn task(&self, id: &Uuid) -> Option<Task> {
        self.db.lock().await.get(id).cloned()
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

/// Drive the worker's queue until `shutdown` flips.
pub async fn run_tasks(worker: Arc<Worker>, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                tracing::info!(worker = %worker.name, "Worker loop stopping");
                return;
            }
        }

        loop {
            let result = match worker.run_pending_event().await {
                Ok(Some(result)) => result,
                Ok(None) => break,
                Err(err) => DockerResult::from(&err),
            };

            if result.is_success() {
                tracing::info!(worker = %worker.name, result = ?result, "Event executed");
            } else {
                tracing::warn!(worker = %worker.name, result = ?result, "Event failed");
            }
        }
    }
}
