// src/graph/order.rs

//! Execution ordering: topological sort, parallel levels and ready sets.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::debug;

use crate::errors::{BeadflowError, Result};
use crate::graph::cycle::ensure_acyclic;
use crate::graph::model::{Graph, NodeId};

/// Kahn's algorithm over the `needs` relation.
///
/// The zero-in-degree frontier is popped by insertion index, so the result
/// is reproducible for a given input order (ids are unique, so no further
/// tie-break is needed).
pub fn topological_sort(graph: &Graph) -> Result<Vec<NodeId>> {
    ensure_acyclic(graph)?;
    let order = kahn_indices(graph);

    if order.len() < graph.len() {
        // Unreachable after `ensure_acyclic`, but never return a partial order.
        let placed: HashSet<usize> = order.iter().copied().collect();
        let remaining = (0..graph.len())
            .filter(|i| !placed.contains(i))
            .map(|i| graph.nodes()[i].id.clone());
        return Err(BeadflowError::cycle(remaining));
    }

    Ok(order
        .into_iter()
        .map(|i| graph.nodes()[i].id.clone())
        .collect())
}

/// Kahn's algorithm on node indices. Returns fewer than `graph.len()`
/// entries when a cycle is present.
pub(crate) fn kahn_indices(graph: &Graph) -> Vec<usize> {
    let n = graph.len();
    let mut in_degree: Vec<usize> = (0..n).map(|i| graph.dep_indices(i).len()).collect();

    let mut frontier: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(node)) = frontier.pop() {
        order.push(node);
        for &succ in graph.dependent_indices(node) {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                frontier.push(Reverse(succ));
            }
        }
    }

    order
}

/// BFS layering: level 0 holds nodes without dependencies, level `k` nodes
/// whose deepest dependency sits in level `k - 1`.
///
/// Nodes inside a level keep insertion order.
pub fn compute_levels(graph: &Graph) -> Result<Vec<Vec<NodeId>>> {
    ensure_acyclic(graph)?;

    let order = kahn_indices(graph);
    let mut level = vec![0usize; graph.len()];
    for &node in &order {
        level[node] = graph
            .dep_indices(node)
            .iter()
            .map(|&d| level[d] + 1)
            .max()
            .unwrap_or(0);
    }

    let depth = level.iter().copied().max().map_or(0, |m| m + 1);
    let mut levels: Vec<Vec<NodeId>> = vec![Vec::new(); depth];
    for (i, node) in graph.nodes().iter().enumerate() {
        levels[level[i]].push(node.id.clone());
    }

    debug!(levels = levels.len(), "computed execution levels");
    Ok(levels)
}

/// Width of the widest level: an upper bound on useful parallelism.
pub fn max_parallelism(graph: &Graph) -> Result<usize> {
    Ok(compute_levels(graph)?
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0))
}

/// All non-completed nodes whose dependencies are all in `completed`,
/// in insertion order.
pub fn ready_set(graph: &Graph, completed: &HashSet<NodeId>) -> Vec<NodeId> {
    graph
        .nodes()
        .iter()
        .filter(|node| !completed.contains(&node.id))
        .filter(|node| node.needs.iter().all(|dep| completed.contains(dep)))
        .map(|node| node.id.clone())
        .collect()
}
