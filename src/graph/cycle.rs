// src/graph/cycle.rs

//! Cycle detection for dependency graphs.
//!
//! [`detect_cycle`] is the mandatory precondition for ordering, leveling,
//! critical-path analysis and execution. It is a three-colour DFS driven by
//! an explicit stack so deep chains cannot overflow the call stack.

use petgraph::algo::tarjan_scc;
use serde::Serialize;
use tracing::debug;

use crate::errors::{BeadflowError, Result};
use crate::graph::model::{Graph, NodeId};

/// Outcome of [`detect_cycle`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub has_cycle: bool,
    /// Closed walk `v0 -> v1 -> ... -> v0`; empty when acyclic.
    ///
    /// A self-loop on `a` is reported as `[a, a]`.
    pub cycle_path: Vec<NodeId>,
}

impl CycleReport {
    /// Convert a positive report into a [`BeadflowError::DependencyCycle`].
    pub fn into_result(self) -> Result<()> {
        if self.has_cycle {
            Err(BeadflowError::DependencyCycle {
                path: self.cycle_path,
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Find one directed cycle, if any. O(V + E).
pub fn detect_cycle(graph: &Graph) -> CycleReport {
    let n = graph.len();
    let mut colour = vec![Colour::White; n];
    // (node, index of the next dependent to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if colour[root] != Colour::White {
            continue;
        }
        colour[root] = Colour::Grey;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let children = graph.dependent_indices(node);

            if frame.1 == children.len() {
                colour[node] = Colour::Black;
                stack.pop();
                continue;
            }

            let next = children[frame.1];
            frame.1 += 1;

            match colour[next] {
                Colour::White => {
                    colour[next] = Colour::Grey;
                    stack.push((next, 0));
                }
                Colour::Grey => {
                    let start = stack.iter().position(|&(v, _)| v == next).unwrap_or(0);
                    let nodes = graph.nodes();
                    let mut cycle_path: Vec<NodeId> = stack[start..]
                        .iter()
                        .map(|&(v, _)| nodes[v].id.clone())
                        .collect();
                    cycle_path.push(nodes[next].id.clone());

                    debug!(cycle = ?cycle_path, "dependency cycle detected");
                    return CycleReport {
                        has_cycle: true,
                        cycle_path,
                    };
                }
                Colour::Black => {}
            }
        }
    }

    CycleReport::default()
}

/// Fail with [`BeadflowError::DependencyCycle`] if the graph is cyclic.
pub fn ensure_acyclic(graph: &Graph) -> Result<()> {
    detect_cycle(graph).into_result()
}

/// Every strongly connected component that contains a cycle.
///
/// Each entry is a sorted list of node ids; self-loops are one-element
/// components. Used for diagnostics when more than one cycle is present.
pub fn strongly_connected_cycles(graph: &Graph) -> Vec<Vec<NodeId>> {
    let g = graph.to_digraph();

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&g)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&node| g.find_edge(node, node).is_some())
        })
        .map(|component| {
            let mut ids: Vec<NodeId> = component.into_iter().map(|idx| g[idx].clone()).collect();
            ids.sort_unstable();
            ids
        })
        .collect();

    cycles.sort_unstable();
    cycles
}
