// src/partition/multiway.rs

//! Multi-way cut by isolating terminals.
//!
//! Each node joins the terminal it is "closest" to, where heavy edges are
//! short (`distance = 1 / max(weight, eps)`). This is a heuristic, not an
//! exact multiway cut.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::{BeadflowError, Result};
use crate::graph::Graph;
use crate::partition::{cut_edges, cut_value, CutEdge, Partition};

const MIN_WEIGHT: f64 = 1e-9;

/// Result of [`multi_way_cut`]; group `k` belongs to `terminals[k]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiwayCut {
    pub cut_value: f64,
    pub cut_edges: Vec<CutEdge>,
    pub partition: Partition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Visit {
    dist: f64,
    node: usize,
}

impl Eq for Visit {}

impl Ord for Visit {
    // Reversed: BinaryHeap is a max-heap, we want the nearest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[instrument(skip(graph), fields(nodes = graph.len()))]
pub fn multi_way_cut(graph: &Graph, terminals: &[&str]) -> Result<MultiwayCut> {
    if terminals.len() < 2 {
        return Err(BeadflowError::PartitionConstraint(format!(
            "multi-way cut needs at least 2 terminals (got {})",
            terminals.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(terminals.len());
    for &t in terminals {
        let idx = graph.index_of(t).ok_or_else(|| {
            BeadflowError::PartitionConstraint(format!("unknown terminal '{t}'"))
        })?;
        if !seen.insert(idx) {
            return Err(BeadflowError::PartitionConstraint(format!(
                "terminal '{t}' listed more than once"
            )));
        }
        sources.push(idx);
    }

    let n = graph.len();
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        if let (Some(u), Some(v)) = (graph.index_of(&edge.from), graph.index_of(&edge.to)) {
            let length = 1.0 / edge.weight.max(MIN_WEIGHT);
            adjacency[u].push((v, length));
            adjacency[v].push((u, length));
        }
    }

    let distances: Vec<Vec<f64>> = sources
        .iter()
        .map(|&s| shortest_paths(&adjacency, s))
        .collect();

    let mut partition = Partition::new(terminals.len());
    for (i, node) in graph.nodes().iter().enumerate() {
        let mut best = 0;
        for k in 1..distances.len() {
            if distances[k][i] < distances[best][i] {
                best = k;
            }
        }
        partition.assignment.insert(node.id.clone(), best);
    }

    let crossing = cut_edges(graph, &partition);
    let value = cut_value(&crossing);
    debug!(terminals = terminals.len(), cut_value = value, "multi-way cut computed");

    Ok(MultiwayCut {
        cut_value: value,
        cut_edges: crossing,
        partition,
    })
}

/// Single-source Dijkstra; unreachable nodes stay at infinity.
fn shortest_paths(adjacency: &[Vec<(usize, f64)>], source: usize) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; adjacency.len()];
    dist[source] = 0.0;
    let mut heap = BinaryHeap::from([Visit {
        dist: 0.0,
        node: source,
    }]);

    while let Some(Visit { dist: d, node }) = heap.pop() {
        if d > dist[node] {
            continue;
        }
        for &(next, length) in &adjacency[node] {
            let candidate = d + length;
            if candidate < dist[next] {
                dist[next] = candidate;
                heap.push(Visit {
                    dist: candidate,
                    node: next,
                });
            }
        }
    }

    dist
}
