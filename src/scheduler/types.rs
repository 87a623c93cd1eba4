use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::worker::WorkerStats;

/// A worker as the scheduler sees it: its position in the roster and the
/// last stats it reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub index: usize,
    pub name: String,
    pub stats: WorkerStats,
}

impl Node {
    pub fn new(index: usize, name: impl Into<String>, stats: WorkerStats) -> Self {
        Self {
            index,
            name: name.into(),
            stats,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    #[default]
    LeastLoaded,
    BinPack,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::LeastLoaded => write!(f, "least-loaded"),
            SchedulerKind::BinPack => write!(f, "bin-pack"),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least-loaded" => Ok(SchedulerKind::LeastLoaded),
            "bin-pack" => Ok(SchedulerKind::BinPack),
            other => Err(format!("unknown scheduler: {}", other)),
        }
    }
}
