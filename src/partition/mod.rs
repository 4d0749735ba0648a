// src/partition/mod.rs

//! Graph partitioning.
//!
//! - [`flow`] computes exact minimum s-t cuts (Edmonds-Karp).
//! - [`spectral`] approximates balanced bisections from the Fiedler vector.
//! - [`multiway`] assigns nodes to the closest of several terminals.
//! - [`optimize`] applies caller constraints on top of the spectral split
//!   and turns the result into module suggestions.

pub mod flow;
pub mod multiway;
pub mod optimize;
pub mod spectral;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::{Edge, Graph, NodeId};

pub use flow::{min_st_cut, StCut};
pub use multiway::{multi_way_cut, MultiwayCut};
pub use optimize::{
    find_optimal_cuts, partition_request, suggest_modules, ModuleSuggestion,
    PartitionConstraints, PartitionOutcome, PartitionRequest,
};
pub use spectral::{fiedler_vector, spectral_bisect, SpectralOptions};

/// Total mapping from node id to a group in `[0, num_groups)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub num_groups: usize,
    pub assignment: BTreeMap<NodeId, usize>,
}

impl Partition {
    pub fn new(num_groups: usize) -> Self {
        Self {
            num_groups,
            assignment: BTreeMap::new(),
        }
    }

    pub fn group_of(&self, id: &str) -> Option<usize> {
        self.assignment.get(id).copied()
    }

    /// Members of `group`, sorted by id.
    pub fn members(&self, group: usize) -> Vec<&str> {
        self.assignment
            .iter()
            .filter(|&(_, &g)| g == group)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_groups];
        for &g in self.assignment.values() {
            if let Some(slot) = sizes.get_mut(g) {
                *slot += 1;
            }
        }
        sizes
    }
}

/// An edge whose endpoints lie in different groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
}

impl From<&Edge> for CutEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            from: edge.from.clone(),
            to: edge.to.clone(),
            weight: edge.weight,
        }
    }
}

/// Edges of `graph` crossing between groups of `partition`, in edge order.
/// Self-loops never cross.
pub fn cut_edges(graph: &Graph, partition: &Partition) -> Vec<CutEdge> {
    graph
        .edges()
        .iter()
        .filter(|e| partition.group_of(&e.from) != partition.group_of(&e.to))
        .map(CutEdge::from)
        .collect()
}

/// Sum of cut-edge weights: the quality metric being minimised.
pub fn cut_value(edges: &[CutEdge]) -> f64 {
    edges.iter().map(|e| e.weight).sum()
}
