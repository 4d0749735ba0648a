// src/partition/flow.rs

//! Minimum s-t cut via Edmonds-Karp max flow.
//!
//! Capacities come from directed edge weights (parallel edges add up). By
//! max-flow/min-cut, the flow value on termination equals the weight of the
//! edges leaving the residual-reachable set of the source.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::{BeadflowError, Result};
use crate::graph::{Graph, NodeId};
use crate::partition::CutEdge;

const FLOW_EPSILON: f64 = 1e-12;

/// Result of [`min_st_cut`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StCut {
    pub cut_value: f64,
    pub cut_edges: Vec<CutEdge>,
    /// Nodes reachable from the source in the final residual graph.
    pub source_set: Vec<NodeId>,
    pub sink_set: Vec<NodeId>,
    /// Number of augmenting paths used.
    pub augmentations: usize,
}

#[instrument(skip(graph), fields(nodes = graph.len()))]
pub fn min_st_cut(graph: &Graph, source: &str, sink: &str) -> Result<StCut> {
    let s = graph.index_of(source).ok_or_else(|| {
        BeadflowError::PartitionConstraint(format!("unknown source node '{source}'"))
    })?;
    let t = graph.index_of(sink).ok_or_else(|| {
        BeadflowError::PartitionConstraint(format!("unknown sink node '{sink}'"))
    })?;
    if s == t {
        return Err(BeadflowError::PartitionConstraint(format!(
            "source and sink must differ (both '{source}')"
        )));
    }

    let n = graph.len();
    let mut residual = vec![vec![0.0f64; n]; n];
    for edge in graph.edges() {
        let (u, v) = (graph.index_of(&edge.from), graph.index_of(&edge.to));
        if let (Some(u), Some(v)) = (u, v) {
            if u != v {
                residual[u][v] += edge.weight;
            }
        }
    }

    let mut max_flow = 0.0;
    let mut augmentations = 0;

    while let Some(parent) = augmenting_path(&residual, s, t) {
        let mut bottleneck = f64::INFINITY;
        let mut v = t;
        while v != s {
            let u = parent[v];
            bottleneck = bottleneck.min(residual[u][v]);
            v = u;
        }

        let mut v = t;
        while v != s {
            let u = parent[v];
            residual[u][v] -= bottleneck;
            residual[v][u] += bottleneck;
            v = u;
        }

        max_flow += bottleneck;
        augmentations += 1;
    }

    let reachable = reachable_from(&residual, s);
    let nodes = graph.nodes();
    let (source_set, sink_set): (Vec<_>, Vec<_>) =
        (0..n).partition(|&i| reachable[i]);

    let cut_edges: Vec<CutEdge> = graph
        .edges()
        .iter()
        .filter(|e| {
            let from = graph.index_of(&e.from).is_some_and(|i| reachable[i]);
            let to = graph.index_of(&e.to).is_some_and(|i| reachable[i]);
            from && !to
        })
        .map(CutEdge::from)
        .collect();

    debug!(
        source,
        sink,
        max_flow,
        augmentations,
        cut_edges = cut_edges.len(),
        "min s-t cut computed"
    );

    Ok(StCut {
        cut_value: max_flow,
        cut_edges,
        source_set: source_set.into_iter().map(|i| nodes[i].id.clone()).collect(),
        sink_set: sink_set.into_iter().map(|i| nodes[i].id.clone()).collect(),
        augmentations,
    })
}

/// BFS for a shortest augmenting path; returns parent links if `t` is
/// reachable through positive residual capacity.
fn augmenting_path(residual: &[Vec<f64>], s: usize, t: usize) -> Option<Vec<usize>> {
    let n = residual.len();
    let mut parent = vec![usize::MAX; n];
    parent[s] = s;
    let mut queue = VecDeque::from([s]);

    while let Some(u) = queue.pop_front() {
        for v in 0..n {
            if parent[v] == usize::MAX && residual[u][v] > FLOW_EPSILON {
                parent[v] = u;
                if v == t {
                    return Some(parent);
                }
                queue.push_back(v);
            }
        }
    }

    None
}

fn reachable_from(residual: &[Vec<f64>], s: usize) -> Vec<bool> {
    let n = residual.len();
    let mut seen = vec![false; n];
    seen[s] = true;
    let mut queue = VecDeque::from([s]);

    while let Some(u) = queue.pop_front() {
        for v in 0..n {
            if !seen[v] && residual[u][v] > FLOW_EPSILON {
                seen[v] = true;
                queue.push_back(v);
            }
        }
    }

    seen
}
