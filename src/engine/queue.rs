// src/engine/queue.rs

//! Work-stealing ready queue.
//!
//! One FIFO per worker slot. New work goes to the shortest queue; a worker
//! takes from the front of its own queue and, when that is empty, steals
//! from the back of the longest other queue. Ties always go to the lowest
//! index so dispatch order is deterministic for a given input.

use std::collections::VecDeque;

use crate::engine::StepContext;
use crate::graph::NodeId;

/// A ready node waiting for a worker. Created once when the node becomes
/// ready and consumed by exactly one dispatch.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub node_id: NodeId,
    pub priority: i32,
    pub context: StepContext,
}

#[derive(Debug, Clone)]
pub struct WorkStealingQueue<T> {
    queues: Vec<VecDeque<T>>,
}

impl<T> WorkStealingQueue<T> {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize) -> Self {
        Self {
            queues: (0..workers.max(1)).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Enqueue on the shortest queue; returns the chosen worker index.
    pub fn push(&mut self, item: T) -> usize {
        let target = self
            .queues
            .iter()
            .enumerate()
            .min_by_key(|(i, q)| (q.len(), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.queues[target].push_back(item);
        target
    }

    /// Next item for `worker`: own front first, then a steal.
    pub fn pop(&mut self, worker: usize) -> Option<T> {
        if let Some(item) = self.queues.get_mut(worker).and_then(VecDeque::pop_front) {
            return Some(item);
        }
        self.steal(worker)
    }

    /// Take from the back of the longest queue other than `thief`'s.
    pub fn steal(&mut self, thief: usize) -> Option<T> {
        let victim = self
            .queues
            .iter()
            .enumerate()
            .filter(|(i, q)| *i != thief && !q.is_empty())
            .max_by_key(|(i, q)| (q.len(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        self.queues[victim].pop_back()
    }

    pub fn queue_len(&self, worker: usize) -> usize {
        self.queues.get(worker).map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }
}
