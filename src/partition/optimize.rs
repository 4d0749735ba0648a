// src/partition/optimize.rs

//! Constrained partitioning and module suggestions.
//!
//! [`find_optimal_cuts`] runs the spectral split with `preserve_boundaries`
//! as pins, then forces each `keep_together` group into a single group.
//! Groups sharing a member are merged first, so overlapping groups never
//! split each other.

use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{BeadflowError, Result};
use crate::graph::{Edge, Graph, NodeId, NodeSpec};
use crate::partition::spectral::{spectral_bisect, SpectralOptions};
use crate::partition::{cut_edges, cut_value, CutEdge, Partition};

/// Caller constraints on a partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionConstraints {
    /// Each inner list must end up in one group.
    #[serde(default)]
    pub keep_together: Vec<Vec<NodeId>>,
    /// Fixed node -> group pins.
    #[serde(default)]
    pub preserve_boundaries: BTreeMap<NodeId, usize>,
}

/// Partition plus its quality metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOutcome {
    pub partition: Partition,
    pub cut_edges: Vec<CutEdge>,
    pub cut_value: f64,
}

/// Wire shape of a partition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRequest {
    pub graph: Vec<NodeSpec>,
    /// Extra weighted edges on top of the `needs` relation.
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub num_groups: usize,
    #[serde(default)]
    pub constraints: PartitionConstraints,
}

/// Handle a [`PartitionRequest`] end to end.
pub fn partition_request(
    request: PartitionRequest,
    options: &SpectralOptions,
) -> Result<PartitionOutcome> {
    let graph = Graph::with_edges(request.graph, request.edges)?;
    find_optimal_cuts(&graph, request.num_groups, &request.constraints, options)
}

pub fn find_optimal_cuts(
    graph: &Graph,
    num_modules: usize,
    constraints: &PartitionConstraints,
    options: &SpectralOptions,
) -> Result<PartitionOutcome> {
    if num_modules < 2 {
        return Err(BeadflowError::PartitionConstraint(format!(
            "number of modules must be >= 2 (got {num_modules})"
        )));
    }
    let groups = resolve_keep_together(graph, constraints)?;

    let mut partition =
        spectral_bisect(graph, num_modules, &constraints.preserve_boundaries, options)?;

    for (members, pinned) in groups {
        let Some(first) = members.first() else {
            continue;
        };
        let target = match pinned {
            Some(group) => group,
            None => partition.group_of(first).unwrap_or(0),
        };
        for id in &members {
            partition.assignment.insert(id.clone(), target);
        }
    }

    let crossing = cut_edges(graph, &partition);
    let value = cut_value(&crossing);

    info!(
        num_modules,
        cut_edges = crossing.len(),
        cut_value = value,
        "partition computed"
    );

    Ok(PartitionOutcome {
        partition,
        cut_edges: crossing,
        cut_value: value,
    })
}

/// Validate `keep_together` groups, merge groups that share a member and
/// find the pin each merged component inherits.
///
/// Components are returned in order of their first appearance; members of
/// a component are in the order they were first listed.
fn resolve_keep_together(
    graph: &Graph,
    constraints: &PartitionConstraints,
) -> Result<Vec<(Vec<NodeId>, Option<usize>)>> {
    let mut sets: UnionFind<usize> = UnionFind::new(graph.len());
    let mut listed: Vec<usize> = Vec::new();
    let mut seen = vec![false; graph.len()];

    for members in &constraints.keep_together {
        let mut first: Option<usize> = None;
        for id in members {
            let Some(index) = graph.index_of(id) else {
                return Err(BeadflowError::PartitionConstraint(format!(
                    "keep-together member '{id}' is not in the graph"
                )));
            };
            if !seen[index] {
                seen[index] = true;
                listed.push(index);
            }
            match first {
                Some(head) => {
                    sets.union(head, index);
                }
                None => first = Some(index),
            }
        }
    }

    // root -> position in `resolved`
    let mut slot: BTreeMap<usize, usize> = BTreeMap::new();
    let mut resolved: Vec<(Vec<NodeId>, Option<(usize, usize)>)> = Vec::new();

    for index in listed {
        let root = sets.find_mut(index);
        let position = *slot.entry(root).or_insert_with(|| {
            resolved.push((Vec::new(), None));
            resolved.len() - 1
        });
        let id = &graph.nodes()[index].id;
        let (members, pin) = &mut resolved[position];
        members.push(id.clone());

        if let Some(&group) = constraints.preserve_boundaries.get(id) {
            match *pin {
                Some((existing, other)) if existing != group => {
                    return Err(BeadflowError::PartitionConstraint(format!(
                        "keep-together group pins '{}' to {existing} and '{id}' to {group}",
                        graph.nodes()[other].id
                    )));
                }
                Some(_) => {}
                None => *pin = Some((group, index)),
            }
        }
    }

    debug!(components = resolved.len(), "keep-together groups merged");
    Ok(resolved
        .into_iter()
        .map(|(members, pin)| (members, pin.map(|(group, _)| group)))
        .collect())
}

/// Summary of one suggested module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSuggestion {
    pub group: usize,
    /// Members in graph insertion order.
    pub members: Vec<NodeId>,
    pub total_weight: f64,
    pub internal_weight: f64,
    pub boundary_weight: f64,
}

/// Turn a partition into per-module summaries (one per group, empty
/// groups included).
pub fn suggest_modules(graph: &Graph, outcome: &PartitionOutcome) -> Vec<ModuleSuggestion> {
    let partition = &outcome.partition;
    let mut modules: Vec<ModuleSuggestion> = (0..partition.num_groups)
        .map(|group| ModuleSuggestion {
            group,
            members: Vec::new(),
            total_weight: 0.0,
            internal_weight: 0.0,
            boundary_weight: 0.0,
        })
        .collect();

    for node in graph.nodes() {
        if let Some(module) = partition
            .group_of(&node.id)
            .and_then(|g| modules.get_mut(g))
        {
            module.members.push(node.id.clone());
            module.total_weight += node.duration();
        }
    }

    for edge in graph.edges() {
        let (Some(a), Some(b)) = (partition.group_of(&edge.from), partition.group_of(&edge.to))
        else {
            continue;
        };
        if a == b {
            if let Some(m) = modules.get_mut(a) {
                m.internal_weight += edge.weight;
            }
        } else {
            for g in [a, b] {
                if let Some(m) = modules.get_mut(g) {
                    m.boundary_weight += edge.weight;
                }
            }
        }
    }

    debug!(modules = modules.len(), "module suggestions built");
    modules
}
