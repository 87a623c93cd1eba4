use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

use crate::scheduler::SchedulerKind;

/// Resources a worker offers to the scheduler.
///
/// Units match [`Task`](crate::tasks::Task): memory in MiB, disk in GiB, cpu
/// in cores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub memory: u64,
    pub disk: u64,
    pub cpu: f64,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            memory: 1024,
            disk: 10,
            cpu: 1.0,
        }
    }
}

impl Capacity {
    pub fn new(memory: u64, disk: u64, cpu: f64) -> Self {
        Self { memory, disk, cpu }
    }

    /// Read total memory, available disk and cpu count from the host.
    pub fn detect() -> Self {
        let sysinfo = System::new_all();
        let disks = Disks::new_with_refreshed_list();
        let disk_bytes: u64 = disks.iter().map(|disk| disk.available_space()).sum();

        Self {
            memory: sysinfo.total_memory() / 1024 / 1024,
            disk: disk_bytes / 1024 / 1024 / 1024,
            cpu: sysinfo.cpus().len() as f64,
        }
    }
}

/// Timing and placement options shared by the manager and worker loops.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the manager tries to place pending tasks.
    pub schedule_interval: Duration,
    /// How often the manager pulls task lists from workers.
    pub reconcile_interval: Duration,
    /// How often a worker checks its event queue.
    pub worker_poll_interval: Duration,
    /// Deadline for a single runtime start or stop.
    pub runtime_timeout: Duration,
    /// How long an unreachable worker is kept before its tasks are orphaned.
    pub worker_grace_period: Duration,
    pub scheduler: SchedulerKind,
    pub capacity: Capacity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(15),
            worker_poll_interval: Duration::from_secs(2),
            runtime_timeout: Duration::from_secs(120),
            worker_grace_period: Duration::from_secs(60),
            scheduler: SchedulerKind::default(),
            capacity: Capacity::default(),
        }
    }
}

impl Config {
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_runtime_timeout(mut self, timeout: Duration) -> Self {
        self.runtime_timeout = timeout;
        self
    }

    pub fn with_worker_grace_period(mut self, grace: Duration) -> Self {
        self.worker_grace_period = grace;
        self
    }
}
