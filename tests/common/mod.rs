#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use cube::config::Capacity;
use cube::manager::{ManagerError, ManagerResult, WorkerClient};
use cube::tasks::{ContainerConfig, Runtime, RuntimeError, State, Task, TaskEvent};
use cube::worker::{Worker, WorkerStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(String),
    Stop(String),
}

/// In-memory runtime that records calls. Stopping an unknown id succeeds.
#[derive(Default)]
pub struct MockRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    running: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started_images(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Start(image) => Some(image),
                RuntimeCall::Stop(_) => None,
            })
            .collect()
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.running.lock().unwrap().contains(container_id)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn start(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        self.calls
            .lock()
            .unwrap()
            .push(RuntimeCall::Start(config.image.clone()));
        self.wait().await;

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RuntimeError::Failed(format!(
                "pull access denied for {}",
                config.image
            )));
        }

        let id = format!("container-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.running.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.calls
            .lock()
            .unwrap()
            .push(RuntimeCall::Stop(container_id.to_string()));
        self.wait().await;

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(RuntimeError::Failed("daemon unavailable".to_string()));
        }

        self.running.lock().unwrap().remove(container_id);
        Ok(())
    }
}

pub fn worker(name: &str, capacity: Capacity, runtime: Arc<MockRuntime>) -> Arc<Worker> {
    Arc::new(Worker::new(name, capacity, runtime, Duration::from_secs(5)))
}

pub fn task(memory: u64, disk: u64) -> Task {
    Task::new("test", "alpine:latest")
        .with_memory(memory)
        .with_disk(disk)
}

/// Worker client whose task list the test controls directly.
pub struct StaticWorker {
    name: String,
    pub stats: Mutex<WorkerStats>,
    pub tasks: Mutex<Vec<Task>>,
    pub received: Mutex<Vec<TaskEvent>>,
}

impl StaticWorker {
    pub fn new(name: &str, stats: WorkerStats) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            stats: Mutex::new(stats),
            tasks: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn report(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }
}

#[async_trait]
impl WorkerClient for StaticWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()> {
        self.received.lock().unwrap().push(event);
        Ok(())
    }

    async fn stats(&self) -> ManagerResult<WorkerStats> {
        Ok(*self.stats.lock().unwrap())
    }

    async fn tasks(&self) -> ManagerResult<Vec<Task>> {
        Ok(self.tasks.lock().unwrap().clone())
    }
}

/// Worker client that can be switched off to simulate a lost host.
pub struct FlakyWorker {
    inner: Arc<StaticWorker>,
    pub down: AtomicBool,
    pub reject_events: AtomicBool,
}

impl FlakyWorker {
    pub fn new(inner: Arc<StaticWorker>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            down: AtomicBool::new(false),
            reject_events: AtomicBool::new(false),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_reject_events(&self, reject: bool) {
        self.reject_events.store(reject, Ordering::SeqCst);
    }

    fn check(&self) -> ManagerResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(ManagerError::WorkerCommunication(format!(
                "{}: connection refused",
                self.inner.name()
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkerClient for FlakyWorker {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()> {
        self.check()?;
        if self.reject_events.load(Ordering::SeqCst) {
            return Err(ManagerError::WorkerCommunication(format!(
                "{}: failed to send event: 500 Internal Server Error",
                self.inner.name()
            )));
        }
        self.inner.enqueue(event).await
    }

    async fn stats(&self) -> ManagerResult<WorkerStats> {
        self.check()?;
        self.inner.stats().await
    }

    async fn tasks(&self) -> ManagerResult<Vec<Task>> {
        self.check()?;
        self.inner.tasks().await
    }
}

/// Worker client that starts the dispatched task right away, then holds
/// `enqueue` open until released.
pub struct GatedWorker {
    inner: Arc<StaticWorker>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedWorker {
    pub fn new(inner: Arc<StaticWorker>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl WorkerClient for GatedWorker {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()> {
        let mut running = event.task.clone();
        running.state = State::Running;
        running.container_id = Some("container-0".to_string());
        self.inner.report(vec![running]);
        self.inner.enqueue(event).await?;

        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn stats(&self) -> ManagerResult<WorkerStats> {
        self.inner.stats().await
    }

    async fn tasks(&self) -> ManagerResult<Vec<Task>> {
        self.inner.tasks().await
    }
}

pub fn stats(task_count: u64, memory: u64, disk: u64) -> WorkerStats {
    WorkerStats {
        task_count,
        memory_available: memory,
        disk_available: disk,
        cpu_available: 1.0,
    }
}
