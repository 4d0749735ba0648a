// src/graph/critical.rs

//! Critical-path analysis (forward / backward pass over a topological order).

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::graph::cycle::detect_cycle;
use crate::graph::model::{Graph, NodeId};
use crate::graph::order::kahn_indices;

const SLACK_EPSILON: f64 = 1e-9;

/// Result of [`critical_path`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CriticalPath {
    /// Zero-slack nodes in topological order.
    pub path: Vec<NodeId>,
    /// One tight dependency chain through the critical nodes, from a
    /// critical root to a critical sink.
    pub chain: Vec<NodeId>,
    /// Project length: the latest earliest-finish.
    pub total_duration: f64,
    /// Latest start minus earliest start, per node.
    pub slack: BTreeMap<NodeId, f64>,
}

/// Longest-path analysis using node weights as durations (default 1.0).
///
/// Returns an empty result for cyclic or empty graphs.
#[instrument(skip(graph), fields(nodes = graph.len()))]
pub fn critical_path(graph: &Graph) -> CriticalPath {
    if graph.is_empty() || detect_cycle(graph).has_cycle {
        return CriticalPath::default();
    }

    let nodes = graph.nodes();
    let order = kahn_indices(graph);
    let n = nodes.len();
    let duration: Vec<f64> = nodes.iter().map(|node| node.duration()).collect();

    // Forward pass.
    let mut earliest_start = vec![0.0f64; n];
    let mut earliest_finish = vec![0.0f64; n];
    for &v in &order {
        earliest_start[v] = graph
            .dep_indices(v)
            .iter()
            .map(|&d| earliest_finish[d])
            .fold(0.0, f64::max);
        earliest_finish[v] = earliest_start[v] + duration[v];
    }

    let total_duration = earliest_finish.iter().copied().fold(0.0, f64::max);

    // Backward pass.
    let mut latest_start = vec![0.0f64; n];
    for &v in order.iter().rev() {
        let latest_finish = graph
            .dependent_indices(v)
            .iter()
            .map(|&s| latest_start[s])
            .fold(total_duration, f64::min);
        latest_start[v] = latest_finish - duration[v];
    }

    let mut slack = BTreeMap::new();
    let mut critical = vec![false; n];
    let mut path = Vec::new();
    for &v in &order {
        let s = (latest_start[v] - earliest_start[v]).max(0.0);
        slack.insert(nodes[v].id.clone(), s);
        if s <= SLACK_EPSILON {
            critical[v] = true;
            path.push(nodes[v].id.clone());
        }
    }

    let position: Vec<usize> = {
        let mut pos = vec![0; n];
        for (p, &v) in order.iter().enumerate() {
            pos[v] = p;
        }
        pos
    };

    let tight = |from: usize, to: usize| {
        (earliest_start[to] - earliest_finish[from]).abs() <= SLACK_EPSILON
    };

    let mut chain = Vec::new();
    let start = order
        .iter()
        .copied()
        .find(|&v| critical[v] && earliest_start[v] <= SLACK_EPSILON);
    if let Some(mut current) = start {
        chain.push(nodes[current].id.clone());
        while let Some(next) = graph
            .dependent_indices(current)
            .iter()
            .copied()
            .filter(|&s| critical[s] && tight(current, s))
            .min_by_key(|&s| position[s])
        {
            chain.push(nodes[next].id.clone());
            current = next;
        }
    }

    debug!(total_duration, critical = path.len(), "critical path computed");

    CriticalPath {
        path,
        chain,
        total_duration,
        slack,
    }
}
