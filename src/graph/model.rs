// src/graph/model.rs

//! Immutable dependency graph and its ingestion format.
//!
//! Edge direction: `dependency -> dependent`. For
//!
//! ```json
//! [{ "id": "a" }, { "id": "b", "needs": ["a"] }]
//! ```
//!
//! we add edge `a -> b`.

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{BeadflowError, Result};

/// Canonical node identifier type used throughout the crate.
pub type NodeId = String;

/// Lifecycle status of a node within a single scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

/// Ingestion record for one node, as supplied by callers (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Duration / weight; must be finite and non-negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Ids this node depends on.
    #[serde(default)]
    pub needs: Vec<String>,

    /// If true, a failure of this node does not abort the run; its
    /// dependents are marked as unsatisfied instead.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Optional shell command, used by the command step runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    #[serde(default)]
    pub priority: i32,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            weight: None,
            needs: Vec::new(),
            continue_on_error: false,
            cmd: None,
            priority: 0,
        }
    }
}

/// What a step does when executed by a runner that interprets actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepAction {
    Noop,
    Shell { cmd: String },
}

/// Typed node metadata (validated at ingestion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub continue_on_error: bool,
    pub action: StepAction,
    pub priority: i32,
}

/// A node of the dependency graph.
///
/// Dependents are not stored here; ask the owning [`Graph`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub title: String,
    pub weight: Option<f64>,
    /// Direct dependencies, deduplicated, in declaration order.
    pub needs: Vec<NodeId>,
    pub meta: NodeMeta,
}

impl GraphNode {
    /// Weight interpreted as a duration (defaults to 1.0).
    pub fn duration(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

/// Directed, weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
        }
    }
}

/// Immutable directed graph with stable insertion order.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    /// Per-node dependency indices (in-neighbours), deduplicated.
    deps: Vec<Vec<usize>>,
    /// Per-node dependent indices (out-neighbours), deduplicated.
    dependents: Vec<Vec<usize>>,
}

impl Graph {
    /// Build a graph from ingestion records. Each `needs` entry becomes an
    /// edge of weight 1.0.
    pub fn from_specs(specs: Vec<NodeSpec>) -> Result<Self> {
        Self::with_edges(specs, Vec::new())
    }

    /// Parse a JSON array of [`NodeSpec`] records.
    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<NodeSpec> = serde_json::from_str(json)?;
        Self::from_specs(specs)
    }

    /// Build a graph from ingestion records plus explicit weighted edges.
    ///
    /// Explicit edges also count as dependencies (`to` needs `from`).
    pub fn with_edges(specs: Vec<NodeSpec>, extra_edges: Vec<Edge>) -> Result<Self> {
        let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            if spec.id.trim().is_empty() {
                return Err(BeadflowError::Structural(format!(
                    "node at position {i} has an empty id"
                )));
            }
            if let Some(w) = spec.weight {
                check_weight(w, || format!("node '{}'", spec.id))?;
            }
            if index.insert(spec.id.clone(), i).is_some() {
                return Err(BeadflowError::Structural(format!(
                    "duplicate node id '{}'",
                    spec.id
                )));
            }
        }

        let mut edges = Vec::new();
        for spec in &specs {
            for dep in &spec.needs {
                if !index.contains_key(dep) {
                    return Err(BeadflowError::Structural(format!(
                        "node '{}' needs unknown node '{}'",
                        spec.id, dep
                    )));
                }
            }
            let mut seen = HashSet::new();
            for dep in spec.needs.iter().filter(|d| seen.insert(d.as_str())) {
                edges.push(Edge::new(dep.clone(), spec.id.clone(), 1.0));
            }
        }

        for edge in &extra_edges {
            for end in [&edge.from, &edge.to] {
                if !index.contains_key(end) {
                    return Err(BeadflowError::Structural(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
            check_weight(edge.weight, || format!("edge {} -> {}", edge.from, edge.to))?;
        }
        edges.extend(extra_edges);

        let n = specs.len();
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &edges {
            let from = index[&edge.from];
            let to = index[&edge.to];
            if !deps[to].contains(&from) {
                deps[to].push(from);
                dependents[from].push(to);
            }
        }

        let ids: Vec<NodeId> = specs.iter().map(|s| s.id.clone()).collect();
        let nodes: Vec<GraphNode> = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                let action = match spec.cmd {
                    Some(cmd) if !cmd.trim().is_empty() => StepAction::Shell { cmd },
                    _ => StepAction::Noop,
                };
                GraphNode {
                    needs: deps[i].iter().map(|&d| ids[d].clone()).collect(),
                    id: spec.id,
                    title: spec.title,
                    weight: spec.weight,
                    meta: NodeMeta {
                        continue_on_error: spec.continue_on_error,
                        action,
                        priority: spec.priority,
                    },
                }
            })
            .collect();

        debug!(nodes = nodes.len(), edges = edges.len(), "graph constructed");

        Ok(Self {
            nodes,
            index,
            edges,
            deps,
            dependents,
        })
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, id: &str) -> &[NodeId] {
        self.node(id).map(|n| n.needs.as_slice()).unwrap_or(&[])
    }

    /// Immediate dependents of a node (derived from the edge set).
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        match self.index.get(id) {
            Some(&i) => self.dependents[i]
                .iter()
                .map(|&d| self.nodes[d].id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn dep_indices(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }

    pub(crate) fn dependent_indices(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }

    /// petgraph view of the graph; node indices match insertion order.
    pub fn to_digraph(&self) -> DiGraph<NodeId, f64> {
        let mut g = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let handles: Vec<_> = self.nodes.iter().map(|n| g.add_node(n.id.clone())).collect();
        for edge in &self.edges {
            g.add_edge(
                handles[self.index[&edge.from]],
                handles[self.index[&edge.to]],
                edge.weight,
            );
        }
        g
    }
}

fn check_weight(w: f64, what: impl FnOnce() -> String) -> Result<()> {
    if !w.is_finite() || w < 0.0 {
        return Err(BeadflowError::Structural(format!(
            "{} has invalid weight {w} (must be finite and >= 0)",
            what()
        )));
    }
    Ok(())
}
