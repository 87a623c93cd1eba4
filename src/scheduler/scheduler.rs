use std::cmp::Ordering;

use super::types::{Node, SchedulerKind};
use crate::tasks::Task;

/// Placement policy: filter workers, score the survivors, pick one.
///
/// Strategies share no mutable state, so one instance can serve concurrent
/// placements. Lower scores are better.
pub trait Scheduler: Send + Sync {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node>;

    fn score(&self, task: &Task, candidate: &Node) -> f64;

    fn pick(&self, candidates: &[Node], scores: &[f64]) -> Option<Node>;

    fn place(&self, task: &Task, nodes: &[Node]) -> Option<Node> {
        let candidates = self.select_candidate_nodes(task, nodes);
        let scores: Vec<f64> = candidates.iter().map(|c| self.score(task, c)).collect();
        self.pick(&candidates, &scores)
    }
}

/// True when the node has room for the task's memory, disk and, if
/// requested, cpu.
pub fn is_feasible(task: &Task, node: &Node) -> bool {
    let stats = &node.stats;
    stats.memory_available >= task.memory
        && stats.disk_available >= task.disk
        && task.cpu.is_none_or(|cpu| stats.cpu_available >= cpu)
}

/// Minimum score wins; equal scores fall back to roster order.
pub fn pick_lowest(candidates: &[Node], scores: &[f64]) -> Option<Node> {
    candidates
        .iter()
        .zip(scores)
        .min_by(|(a, sa), (b, sb)| match sa.total_cmp(sb) {
            Ordering::Equal => a.index.cmp(&b.index),
            other => other,
        })
        .map(|(node, _)| node.clone())
}

fn feasible_nodes(task: &Task, nodes: &[Node]) -> Vec<Node> {
    nodes
        .iter()
        .filter(|node| is_feasible(task, node))
        .cloned()
        .collect()
}

/// Spreads work by preferring the worker running the fewest tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl Scheduler for LeastLoaded {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        feasible_nodes(task, nodes)
    }

    fn score(&self, _task: &Task, candidate: &Node) -> f64 {
        candidate.stats.task_count as f64
    }

    fn pick(&self, candidates: &[Node], scores: &[f64]) -> Option<Node> {
        pick_lowest(candidates, scores)
    }
}

/// Packs tasks onto the worker left with the least free memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinPack;

impl Scheduler for BinPack {
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        feasible_nodes(task, nodes)
    }

    fn score(&self, task: &Task, candidate: &Node) -> f64 {
        candidate.stats.memory_available.saturating_sub(task.memory) as f64
    }

    fn pick(&self, candidates: &[Node], scores: &[f64]) -> Option<Node> {
        pick_lowest(candidates, scores)
    }
}

impl SchedulerKind {
    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            SchedulerKind::LeastLoaded => Box::new(LeastLoaded),
            SchedulerKind::BinPack => Box::new(BinPack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerStats;

    fn node(index: usize, task_count: u64, memory: u64, disk: u64) -> Node {
        Node::new(
            index,
            format!("worker-{}", index),
            WorkerStats {
                task_count,
                memory_available: memory,
                disk_available: disk,
                cpu_available: 1.0,
            },
        )
    }

    fn task(memory: u64, disk: u64) -> Task {
        Task::new("t", "alpine").with_memory(memory).with_disk(disk)
    }

    #[test]
    fn candidates_need_memory_and_disk() {
        let nodes = vec![node(0, 0, 256, 10), node(1, 0, 1024, 0), node(2, 0, 1024, 10)];
        let candidates = LeastLoaded.select_candidate_nodes(&task(512, 1), &nodes);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "worker-2");
    }

    #[test]
    fn exact_fit_is_feasible() {
        assert!(is_feasible(&task(512, 1), &node(0, 0, 512, 1)));
    }

    #[test]
    fn cpu_only_checked_when_requested() {
        let n = node(0, 0, 1024, 10);
        assert!(is_feasible(&task(1, 1), &n));
        assert!(is_feasible(&task(1, 1).with_cpu(1.0), &n));
        assert!(!is_feasible(&task(1, 1).with_cpu(1.5), &n));
    }

    #[test]
    fn no_candidates_places_nothing() {
        let nodes = vec![node(0, 0, 128, 10)];
        assert!(LeastLoaded.place(&task(512, 1), &nodes).is_none());
        assert!(LeastLoaded.place(&task(1, 1), &[]).is_none());
    }

    #[test]
    fn least_loaded_prefers_fewest_tasks() {
        let nodes = vec![node(0, 3, 1024, 10), node(1, 1, 1024, 10), node(2, 2, 1024, 10)];
        let picked = LeastLoaded.place(&task(64, 1), &nodes).unwrap();
        assert_eq!(picked.name, "worker-1");
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let nodes = vec![node(0, 1, 1024, 10), node(1, 1, 1024, 10), node(2, 1, 1024, 10)];
        let picked = LeastLoaded.place(&task(64, 1), &nodes).unwrap();
        assert_eq!(picked.index, 0);
    }

    #[test]
    fn placement_is_deterministic() {
        let nodes = vec![node(0, 2, 2048, 10), node(1, 2, 1024, 10), node(2, 0, 512, 10)];
        let t = task(256, 1);
        let first = LeastLoaded.place(&t, &nodes);
        for _ in 0..10 {
            assert_eq!(LeastLoaded.place(&t, &nodes), first);
        }
    }

    #[test]
    fn bin_pack_prefers_tightest_fit() {
        let nodes = vec![node(0, 0, 4096, 10), node(1, 5, 600, 10), node(2, 0, 1024, 10)];
        let picked = BinPack.place(&task(512, 1), &nodes).unwrap();
        assert_eq!(picked.name, "worker-1");
    }

    #[test]
    fn pick_uses_supplied_scores() {
        let nodes = vec![node(0, 0, 1024, 10), node(1, 0, 1024, 10)];
        let picked = pick_lowest(&nodes, &[2.0, 1.0]).unwrap();
        assert_eq!(picked.index, 1);
        assert!(pick_lowest(&[], &[]).is_none());
    }

    #[test]
    fn kind_builds_matching_strategy() {
        let nodes = vec![node(0, 0, 4096, 10), node(1, 3, 600, 10)];
        let t = task(512, 1);
        assert_eq!(SchedulerKind::LeastLoaded.build().place(&t, &nodes).unwrap().index, 0);
        assert_eq!(SchedulerKind::BinPack.build().place(&t, &nodes).unwrap().index, 1);
        assert_eq!("bin-pack".parse::<SchedulerKind>(), Ok(SchedulerKind::BinPack));
        assert!("random".parse::<SchedulerKind>().is_err());
    }
}
