pub mod scheduler;
pub mod types;

pub use scheduler::{BinPack, LeastLoaded, Scheduler, is_feasible, pick_lowest};
pub use types::{Node, SchedulerKind};
