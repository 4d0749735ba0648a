// src/engine/state.rs

//! Per-run node state.
//!
//! `RunState` is the single owner of node statuses and results for one run.
//! It is pure: the scheduler feeds it completions and acts on what it
//! returns (newly ready nodes, newly unsatisfied nodes).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::StepResult;
use crate::graph::{Graph, NodeId, NodeStatus};

#[derive(Debug, Clone)]
pub struct RunState {
    graph: Arc<Graph>,
    status: Vec<NodeStatus>,
    /// Dependencies of each node that have not completed successfully yet.
    remaining: Vec<usize>,
    results: BTreeMap<NodeId, StepResult>,
    order: Vec<NodeId>,
}

impl RunState {
    pub fn new(graph: Arc<Graph>) -> Self {
        let n = graph.len();
        let remaining = (0..n).map(|i| graph.dep_indices(i).len()).collect();
        Self {
            graph,
            status: vec![NodeStatus::Pending; n],
            remaining,
            results: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn status(&self, i: usize) -> NodeStatus {
        self.status[i]
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.graph.index_of(id).map(|i| self.status[i])
    }

    /// Promote every `Pending` node without outstanding dependencies to
    /// `Ready` and return them in insertion order.
    pub fn collect_ready(&mut self) -> Vec<usize> {
        let mut ready = Vec::new();
        for i in 0..self.status.len() {
            if self.status[i] == NodeStatus::Pending && self.remaining[i] == 0 {
                self.status[i] = NodeStatus::Ready;
                ready.push(i);
            }
        }
        ready
    }

    /// `Ready -> Running`. Returns false for any other starting status.
    pub fn mark_running(&mut self, i: usize) -> bool {
        if self.status[i] != NodeStatus::Ready {
            warn!(
                node = %self.graph.nodes()[i].id,
                status = ?self.status[i],
                "refusing to start a node that is not ready"
            );
            return false;
        }
        self.status[i] = NodeStatus::Running;
        true
    }

    /// Every dependency of `i` has completed successfully.
    pub fn deps_satisfied(&self, i: usize) -> bool {
        self.graph
            .dep_indices(i)
            .iter()
            .all(|&d| self.status[d] == NodeStatus::Completed)
    }

    /// Results of `i`'s direct dependencies recorded so far.
    pub fn dependency_results(&self, i: usize) -> BTreeMap<NodeId, StepResult> {
        self.graph
            .dep_indices(i)
            .iter()
            .filter_map(|&d| {
                let id = &self.graph.nodes()[d].id;
                self.results.get(id).map(|r| (id.clone(), r.clone()))
            })
            .collect()
    }

    /// Record a successful result for `i` and return the dependents that
    /// became ready because of it.
    pub fn record_success(&mut self, i: usize, result: StepResult) -> Vec<usize> {
        if !self.record(i, NodeStatus::Completed, result) {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for &d in self.graph.dependent_indices(i) {
            self.remaining[d] = self.remaining[d].saturating_sub(1);
            if self.remaining[d] == 0 && self.status[d] == NodeStatus::Pending {
                self.status[d] = NodeStatus::Ready;
                ready.push(d);
            }
        }
        ready
    }

    /// Record a failed result for `i` and fail every transitive dependent
    /// that has not finished yet with a synthetic "dependency not
    /// satisfied" result. Returns those synthetic results.
    pub fn record_failure(&mut self, i: usize, result: StepResult) -> Vec<StepResult> {
        if !self.record(i, NodeStatus::Failed, result) {
            return Vec::new();
        }

        let mut stack: Vec<(usize, usize)> = self
            .graph
            .dependent_indices(i)
            .iter()
            .map(|&d| (d, i))
            .collect();
        let mut newly_failed = Vec::new();

        while let Some((node, cause)) = stack.pop() {
            match self.status[node] {
                NodeStatus::Pending | NodeStatus::Ready => {
                    let id = self.graph.nodes()[node].id.clone();
                    let cause_id = &self.graph.nodes()[cause].id;
                    debug!(node = %id, cause = %cause_id, "marking dependent unsatisfied");

                    let synthetic = StepResult::unsatisfied(id, cause_id);
                    self.record(node, NodeStatus::Failed, synthetic.clone());
                    newly_failed.push(synthetic);
                    stack.extend(self.graph.dependent_indices(node).iter().map(|&d| (d, node)));
                }
                NodeStatus::Running => {
                    // Cannot happen: a running node had all dependencies completed.
                    warn!(
                        node = %self.graph.nodes()[node].id,
                        "dependent of a failed node is already running"
                    );
                }
                NodeStatus::Completed | NodeStatus::Failed => {}
            }
        }

        newly_failed
    }

    fn record(&mut self, i: usize, status: NodeStatus, result: StepResult) -> bool {
        let id = self.graph.nodes()[i].id.clone();
        if self.results.contains_key(&id) {
            warn!(node = %id, "ignoring second result for node");
            return false;
        }
        self.status[i] = status;
        self.order.push(id.clone());
        self.results.insert(id, result);
        true
    }

    pub fn all_terminal(&self) -> bool {
        self.status.iter().all(|s| s.is_terminal())
    }

    pub fn completed_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == NodeStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| **s == NodeStatus::Failed)
            .count()
    }

    pub fn result(&self, id: &str) -> Option<&StepResult> {
        self.results.get(id)
    }

    pub fn results(&self) -> &BTreeMap<NodeId, StepResult> {
        &self.results
    }

    /// Node ids in the order their results were recorded.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn into_parts(self) -> (BTreeMap<NodeId, StepResult>, Vec<NodeId>) {
        (self.results, self.order)
    }
}
