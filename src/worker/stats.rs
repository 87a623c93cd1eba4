use std::collections::HashSet;

use super::types::{Worker, WorkerStats};
use crate::config::Capacity;
use crate::tasks::{State, Task};

impl WorkerStats {
    /// Subtract the requests of `active` tasks from `capacity`.
    pub fn compute<'a>(capacity: &Capacity, active: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut stats = WorkerStats {
            task_count: 0,
            memory_available: capacity.memory,
            disk_available: capacity.disk,
            cpu_available: capacity.cpu,
        };

        for task in active {
            stats.task_count += 1;
            stats.memory_available = stats.memory_available.saturating_sub(task.memory);
            stats.disk_available = stats.disk_available.saturating_sub(task.disk);
            stats.cpu_available = (stats.cpu_available - task.cpu.unwrap_or(0.0)).max(0.0);
        }

        stats
    }
}

impl Worker {
    /// Capacity left after every non-terminal task, including tasks whose
    /// Scheduled event is still waiting in the queue.
    pub async fn stats(&self) -> WorkerStats {
        let queue = self.queue.lock().await;
        let db = self.db.lock().await;

        let mut seen = HashSet::new();
        let stored = db.values().filter(|task| !task.state.is_terminal());
        let queued = queue
            .iter()
            .filter(|event| event.state == State::Scheduled && !db.contains_key(&event.task.id))
            .map(|event| &event.task);

        let active = stored.chain(queued).filter(|task| seen.insert(task.id));
        WorkerStats::compute(&self.capacity, active)
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }
}
