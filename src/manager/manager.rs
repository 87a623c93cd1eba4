use std::{collections::VecDeque, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use uuid::Uuid;

use super::client::WorkerClient;
use super::types::{
    Assignment, ClusterStore, Manager, ManagerError, ManagerResult, ReconcileSummary,
    WorkerRecord,
};
use crate::config::Config;
use crate::scheduler::{Node, Scheduler};
use crate::tasks::{State, Task, TaskEvent, valid_state_transition};
use crate::worker::WorkerStats;

impl Manager {
    pub fn new(scheduler: Box<dyn Scheduler>, grace_period: Duration) -> Self {
        Manager {
            pending: Mutex::new(VecDeque::new()),
            store: Mutex::new(ClusterStore::default()),
            workers: Mutex::new(Vec::new()),
            scheduler,
            grace_period,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.scheduler.build(), config.worker_grace_period)
    }

    pub async fn register_worker(&self, client: Arc<dyn WorkerClient>) {
        let mut workers = self.workers.lock().await;
        if workers.iter().any(|w| w.name() == client.name()) {
            tracing::warn!(worker = %client.name(), "Worker already registered");
            return;
        }
        tracing::info!(worker = %client.name(), "Worker registered");
        workers.push(WorkerRecord::new(client));
    }

    pub async fn worker_names(&self) -> Vec<String> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| w.name().to_string())
            .collect()
    }

    /// Last stats seen for `name`, refreshed on every scheduling attempt.
    pub async fn worker_stats(&self, name: &str) -> Option<WorkerStats> {
        self.workers
            .lock()
            .await
            .iter()
            .find(|w| w.name() == name)
            .and_then(|w| w.stats)
    }

    /// Admit a task. Placement happens later in [`Manager::schedule_one`].
    pub async fn submit_task(&self, mut task: Task) -> Uuid {
        task.state = State::Pending;
        task.container_id = None;
        let id = task.id;
        tracing::info!(task_id = %id, name = %task.name, "Task submitted");
        self.pending.lock().await.push_back(task);
        id
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn get_task(&self, id: Uuid) -> ManagerResult<Task> {
        if let Some(task) = self.pending.lock().await.iter().find(|t| t.id == id) {
            return Ok(task.clone());
        }

        self.store
            .lock()
            .await
            .tasks
            .values()
            .flatten()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(ManagerError::TaskNotFound(id))
    }

    /// Pending tasks first, then placed tasks grouped by worker name.
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.pending.lock().await.iter().cloned().collect();

        let store = self.store.lock().await;
        let mut owners: Vec<&String> = store.tasks.keys().collect();
        owners.sort();
        for owner in owners {
            tasks.extend(store.tasks[owner].iter().cloned());
        }
        tasks
    }

    pub async fn events(&self, worker: &str) -> Vec<TaskEvent> {
        self.store
            .lock()
            .await
            .events
            .get(worker)
            .cloned()
            .unwrap_or_default()
    }

    async fn clients(&self) -> Vec<Arc<dyn WorkerClient>> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| w.client.clone())
            .collect()
    }

    async fn client(&self, name: &str) -> Option<Arc<dyn WorkerClient>> {
        self.workers
            .lock()
            .await
            .iter()
            .find(|w| w.name() == name)
            .map(|w| w.client.clone())
    }

    async fn mark_seen(&self, name: &str, stats: Option<WorkerStats>) {
        let mut workers = self.workers.lock().await;
        if let Some(record) = workers.iter_mut().find(|w| w.name() == name) {
            record.last_seen = Utc::now();
            if stats.is_some() {
                record.stats = stats;
            }
        }
    }

    /// Fresh stats from every reachable worker, in roster order.
    async fn live_nodes(&self) -> Vec<Node> {
        let mut nodes = Vec::new();

        for (index, client) in self.clients().await.into_iter().enumerate() {
            match client.stats().await {
                Ok(stats) => {
                    self.mark_seen(client.name(), Some(stats)).await;
                    nodes.push(Node::new(index, client.name(), stats));
                }
                Err(err) => {
                    tracing::warn!(worker = %client.name(), error = %err, "Skipping worker without stats");
                }
            }
        }

        nodes
    }

    /// Place the oldest pending task. `Ok(None)` means nothing was pending.
    ///
    /// A task that cannot be placed or dispatched goes to the back of the
    /// pending queue.
    pub async fn schedule_one(&self) -> ManagerResult<Option<Assignment>> {
        let Some(task) = self.pending.lock().await.pop_front() else {
            return Ok(None);
        };
        let task_id = task.id;

        if !valid_state_transition(task.state, State::Scheduled) {
            tracing::error!(task_id = %task_id, state = %task.state, "Pending task cannot be scheduled");
            return Err(ManagerError::InvalidTransition {
                task_id,
                from: task.state,
                to: State::Scheduled,
            });
        }

        let nodes = self.live_nodes().await;
        let Some(node) = self.scheduler.place(&task, &nodes) else {
            tracing::debug!(task_id = %task_id, memory = task.memory, disk = task.disk, "No feasible worker");
            self.pending.lock().await.push_back(task);
            return Err(ManagerError::NoFeasibleWorker(task_id));
        };

        let Some(client) = self.client(&node.name).await else {
            self.pending.lock().await.push_back(task);
            return Err(ManagerError::UnknownWorker(node.name));
        };

        let mut scheduled = task.clone();
        scheduled.state = State::Scheduled;
        let event = TaskEvent::new(State::Scheduled, scheduled.clone());

        // Record before dispatch so a concurrent reconcile finds the task.
        self.store
            .lock()
            .await
            .record_assignment(&node.name, scheduled, event.clone());

        if let Err(err) = client.enqueue(event.clone()).await {
            tracing::warn!(task_id = %task_id, worker = %node.name, error = %err, "Error sending event");
            self.store
                .lock()
                .await
                .forget_assignment(&node.name, task_id, event.id);
            self.pending.lock().await.push_back(task);
            return Err(err);
        }

        tracing::info!(task_id = %task_id, worker = %node.name, "Task scheduled");
        Ok(Some(Assignment {
            task_id,
            worker: node.name,
        }))
    }

    /// Ask the owning worker to stop a placed task.
    pub async fn stop_task(&self, task_id: Uuid) -> ManagerResult<()> {
        let (worker, task) = {
            let store = self.store.lock().await;
            let worker = store
                .owners
                .get(&task_id)
                .cloned()
                .ok_or(ManagerError::TaskNotFound(task_id))?;
            let task = store
                .tasks
                .get(&worker)
                .and_then(|tasks| tasks.iter().find(|t| t.id == task_id))
                .cloned()
                .ok_or(ManagerError::TaskNotFound(task_id))?;
            (worker, task)
        };

        if task.state.is_terminal() {
            return Err(ManagerError::InvalidTransition {
                task_id,
                from: task.state,
                to: State::Completed,
            });
        }

        let client = self
            .client(&worker)
            .await
            .ok_or_else(|| ManagerError::UnknownWorker(worker.clone()))?;

        let event = TaskEvent::new(State::Completed, task);
        client.enqueue(event.clone()).await?;

        tracing::info!(task_id = %task_id, worker = %worker, "Stop requested");
        self.store
            .lock()
            .await
            .events
            .entry(worker)
            .or_default()
            .push(event);
        Ok(())
    }

    /// Pull every worker's task list into the cluster store.
    ///
    /// Workers that stay unreachable past the grace period are dropped and
    /// their unfinished tasks marked Failed.
    pub async fn reconcile(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for client in self.clients().await {
            let name = client.name().to_string();
            match client.tasks().await {
                Ok(tasks) => {
                    self.mark_seen(&name, None).await;
                    summary.updated += self.merge_worker_tasks(&name, tasks).await;
                }
                Err(err) => {
                    tracing::warn!(worker = %name, error = %err, "Error fetching worker tasks");
                    summary.unreachable.push(name.clone());
                    if self.grace_expired(&name).await {
                        summary.updated += self.drop_worker(&name).await;
                        summary.dropped.push(name);
                    }
                }
            }
        }

        summary
    }

    async fn merge_worker_tasks(&self, worker: &str, reported: Vec<Task>) -> usize {
        let mut store = self.store.lock().await;
        let ClusterStore {
            tasks,
            events,
            owners,
        } = &mut *store;
        let cached = tasks.entry(worker.to_string()).or_default();
        let mut changed = 0;

        for task in reported {
            let Some(local) = cached.iter_mut().find(|t| t.id == task.id) else {
                tracing::info!(task_id = %task.id, worker, state = %task.state, "Adopting task reported by worker");
                owners.insert(task.id, worker.to_string());
                events
                    .entry(worker.to_string())
                    .or_default()
                    .push(TaskEvent::new(task.state, task.clone()));
                cached.push(task);
                changed += 1;
                continue;
            };

            let previous = local.state;
            local.state = task.state;
            local.container_id = task.container_id;
            local.start_time = task.start_time;
            local.finish_time = task.finish_time;
            local.error = task.error;

            if previous != local.state {
                tracing::info!(task_id = %local.id, worker, from = %previous, to = %local.state, "Task state changed");
                events
                    .entry(worker.to_string())
                    .or_default()
                    .push(TaskEvent::new(local.state, local.clone()));
                changed += 1;
            }
        }

        changed
    }

    async fn grace_expired(&self, name: &str) -> bool {
        let workers = self.workers.lock().await;
        let Some(record) = workers.iter().find(|w| w.name() == name) else {
            return false;
        };
        let silent = (Utc::now() - record.last_seen)
            .to_std()
            .unwrap_or(Duration::ZERO);
        silent >= self.grace_period
    }

    async fn drop_worker(&self, name: &str) -> usize {
        self.workers.lock().await.retain(|w| w.name() != name);
        tracing::warn!(worker = %name, "Worker dropped from roster");

        let mut store = self.store.lock().await;
        let ClusterStore { tasks, events, .. } = &mut *store;
        let Some(owned) = tasks.get_mut(name) else {
            return 0;
        };

        let mut orphaned = 0;
        for task in owned.iter_mut().filter(|t| !t.state.is_terminal()) {
            task.state = State::Failed;
            task.finish_time = Some(Utc::now());
            task.error = Some(format!("worker {} is no longer reachable", name));
            tracing::warn!(task_id = %task.id, worker = %name, "Task orphaned");
            events
                .entry(name.to_string())
                .or_default()
                .push(TaskEvent::new(State::Failed, task.clone()));
            orphaned += 1;
        }

        orphaned
    }
}

impl ClusterStore {
    /// Upsert `task` under `worker` and append its dispatch event.
    fn record_assignment(&mut self, worker: &str, task: Task, event: TaskEvent) {
        self.owners.insert(task.id, worker.to_string());
        self.events.entry(worker.to_string()).or_default().push(event);

        let cached = self.tasks.entry(worker.to_string()).or_default();
        match cached.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => cached.push(task),
        }
    }

    fn forget_assignment(&mut self, worker: &str, task_id: Uuid, event_id: Uuid) {
        if let Some(cached) = self.tasks.get_mut(worker) {
            cached.retain(|t| t.id != task_id);
        }
        if let Some(events) = self.events.get_mut(worker) {
            events.retain(|e| e.id != event_id);
        }
        if self.owners.get(&task_id).is_some_and(|owner| owner == worker) {
            self.owners.remove(&task_id);
        }
    }
}

/// Place pending tasks every `interval` until `shutdown` flips.
pub async fn run_scheduler(manager: Arc<Manager>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                tracing::info!("Scheduler loop stopping");
                return;
            }
        }

        // One attempt per task queued at the start of the tick, so an
        // unplaceable task cannot spin the loop.
        let batch = manager.pending_len().await;
        for _ in 0..batch {
            match manager.schedule_one().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(ManagerError::NoFeasibleWorker(task_id)) => {
                    tracing::debug!(task_id = %task_id, "Task requeued");
                }
                Err(err) => tracing::warn!(error = %err, "Scheduling failed"),
            }
        }
    }
}

/// Reconcile with every worker each `interval` until `shutdown` flips.
pub async fn run_reconciler(manager: Arc<Manager>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                tracing::info!("Reconciliation loop stopping");
                return;
            }
        }

        let summary = manager.reconcile().await;
        if summary.updated > 0 || !summary.unreachable.is_empty() {
            tracing::info!(
                updated = summary.updated,
                unreachable = ?summary.unreachable,
                dropped = ?summary.dropped,
                "Reconciled workers"
            );
        }
    }
}
