// src/partition/spectral.rs

//! Spectral bisection from an approximate Fiedler vector.
//!
//! # Algorithm
//!
//! 1. Symmetrize edge weights into `W` and build `L = D - W`.
//! 2. Run a fixed number of power iterations on `cI - L`, with
//!    `c = 2 * max_degree` (an upper bound on the spectrum of `L`), so the
//!    dominant direction is the eigenvector of the *smallest* eigenvalues.
//! 3. After each multiplication, project out the all-ones vector (the
//!    trivial eigenvector of `L`) and renormalize. What remains converges
//!    towards the Fiedler vector.
//!
//! The iteration budget is fixed (default 50) and there is no convergence
//! check: the result is an approximation, not a certified eigenvector.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{BeadflowError, Result};
use crate::graph::{Graph, NodeId};
use crate::partition::Partition;

/// Tuning for the power iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralOptions {
    pub iterations: usize,
    /// Seed for the random start vector.
    pub seed: u64,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self {
            iterations: 50,
            seed: 0x5eed_f1ed,
        }
    }
}

/// Approximate Fiedler vector, one component per node in insertion order.
#[instrument(skip(graph), fields(nodes = graph.len()))]
pub fn fiedler_vector(graph: &Graph, options: &SpectralOptions) -> Vec<f64> {
    let n = graph.len();
    if n == 0 {
        return Vec::new();
    }

    // Symmetrized adjacency list; parallel entries are summed on multiply.
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut degree = vec![0.0f64; n];
    for edge in graph.edges() {
        let (Some(u), Some(v)) = (graph.index_of(&edge.from), graph.index_of(&edge.to)) else {
            continue;
        };
        if u == v || edge.weight == 0.0 {
            continue;
        }
        adjacency[u].push((v, edge.weight));
        adjacency[v].push((u, edge.weight));
        degree[u] += edge.weight;
        degree[v] += edge.weight;
    }

    let max_degree = degree.iter().copied().fold(0.0, f64::max);
    let shift = if max_degree > 0.0 { 2.0 * max_degree } else { 1.0 };

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    deflate_and_normalize(&mut x);

    let mut next = vec![0.0f64; n];
    for _ in 0..options.iterations {
        // next = (cI - L) x = c x - D x + W x
        for i in 0..n {
            let wx: f64 = adjacency[i].iter().map(|&(j, w)| w * x[j]).sum();
            next[i] = shift * x[i] - degree[i] * x[i] + wx;
        }
        std::mem::swap(&mut x, &mut next);
        if !deflate_and_normalize(&mut x) {
            break;
        }
    }

    debug!(iterations = options.iterations, shift, "fiedler vector approximated");
    x
}

/// Remove the all-ones component and scale to unit length.
///
/// Returns `false` if the vector collapsed to zero.
fn deflate_and_normalize(x: &mut [f64]) -> bool {
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    for v in x.iter_mut() {
        *v -= mean;
    }
    let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return false;
    }
    for v in x.iter_mut() {
        *v /= norm;
    }
    true
}

/// Split nodes into `num_groups` groups using the Fiedler ordering.
///
/// - `num_groups == 2`: non-negative component -> group 0, negative -> 1.
/// - `num_groups > 2`: nodes sorted by component, cut into equal
///   contiguous bins.
///
/// Nodes in `fixed` keep their pinned group; their edges still shape the
/// vector used to place everyone else.
pub fn spectral_bisect(
    graph: &Graph,
    num_groups: usize,
    fixed: &BTreeMap<NodeId, usize>,
    options: &SpectralOptions,
) -> Result<Partition> {
    if num_groups < 2 {
        return Err(BeadflowError::PartitionConstraint(format!(
            "num_groups must be >= 2 (got {num_groups})"
        )));
    }
    for (id, &group) in fixed {
        if !graph.contains(id) {
            return Err(BeadflowError::PartitionConstraint(format!(
                "fixed node '{id}' is not in the graph"
            )));
        }
        if group >= num_groups {
            return Err(BeadflowError::PartitionConstraint(format!(
                "fixed node '{id}' pinned to group {group}, but only {num_groups} groups exist"
            )));
        }
    }

    let nodes = graph.nodes();
    let n = nodes.len();
    let mut partition = Partition::new(num_groups);

    let mut groups = vec![0usize; n];
    if n >= 2 {
        let fiedler = fiedler_vector(graph, options);
        if num_groups == 2 {
            for (i, &value) in fiedler.iter().enumerate() {
                groups[i] = usize::from(value < 0.0);
            }
        } else {
            let mut ranked: Vec<usize> = (0..n).collect();
            ranked.sort_by(|&a, &b| fiedler[a].total_cmp(&fiedler[b]).then(a.cmp(&b)));
            for (rank, &i) in ranked.iter().enumerate() {
                groups[i] = (rank * num_groups / n).min(num_groups - 1);
            }
        }
    }

    for (i, node) in nodes.iter().enumerate() {
        let group = fixed.get(&node.id).copied().unwrap_or(groups[i]);
        partition.assignment.insert(node.id.clone(), group);
    }

    debug!(
        num_groups,
        pinned = fixed.len(),
        sizes = ?partition.group_sizes(),
        "spectral partition computed"
    );
    Ok(partition)
}
