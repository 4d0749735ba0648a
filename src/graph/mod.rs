// src/graph/mod.rs

//! Graph model and pure analysis.
//!
//! - [`model`] holds the immutable graph and the JSON ingestion records.
//! - [`cycle`] detects cycles (precondition for everything below).
//! - [`order`] provides topological order, parallel levels and ready sets.
//! - [`critical`] computes the critical path and per-node slack.
//!
//! None of these mutate the graph; they return derived structures.

pub mod critical;
pub mod cycle;
pub mod model;
pub mod order;

pub use critical::{critical_path, CriticalPath};
pub use cycle::{detect_cycle, ensure_acyclic, strongly_connected_cycles, CycleReport};
pub use model::{Edge, Graph, GraphNode, NodeId, NodeMeta, NodeSpec, NodeStatus, StepAction};
pub use order::{compute_levels, max_parallelism, ready_set, topological_sort};
