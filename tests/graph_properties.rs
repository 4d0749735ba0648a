// tests/graph_properties.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::is_cyclic_directed;
use proptest::prelude::*;

use beadflow::graph::{
    Graph, NodeSpec, compute_levels, critical_path, detect_cycle, topological_sort,
};

// Acyclic by construction: node i may only depend on nodes 0..i.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Graph> {
    (1..=max_nodes).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n),
            proptest::collection::vec(0.0f64..10.0, n),
        )
            .prop_map(move |(raw_deps, weights)| {
                let specs = raw_deps
                    .into_iter()
                    .zip(weights)
                    .enumerate()
                    .map(|(i, (deps, weight))| {
                        let mut spec = NodeSpec::new(format!("n{i}"));
                        spec.weight = Some(weight);
                        if i > 0 {
                            let unique: BTreeSet<usize> = deps.into_iter().map(|d| d % i).collect();
                            spec.needs = unique.into_iter().map(|d| format!("n{d}")).collect();
                        }
                        spec
                    })
                    .collect();
                Graph::from_specs(specs).expect("generated graph must be valid")
            })
    })
}

// Arbitrary directed graph, possibly cyclic (self-loops included).
fn any_graph_strategy(max_nodes: usize) -> impl Strategy<Value = Graph> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(0..n, 0..3), n).prop_map(
            move |raw_deps| {
                let specs = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, deps)| {
                        let mut spec = NodeSpec::new(format!("n{i}"));
                        spec.needs = deps.into_iter().map(|d| format!("n{d}")).collect();
                        spec
                    })
                    .collect();
                Graph::from_specs(specs).expect("generated graph must be valid")
            },
        )
    })
}

proptest! {
    #[test]
    fn topological_order_respects_every_edge(graph in dag_strategy(12)) {
        let order = topological_sort(&graph).expect("acyclic by construction");
        prop_assert_eq!(order.len(), graph.len());

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for edge in graph.edges() {
            prop_assert!(position[edge.from.as_str()] < position[edge.to.as_str()]);
        }
    }

    #[test]
    fn levels_place_nodes_after_their_dependencies(graph in dag_strategy(12)) {
        let levels = compute_levels(&graph).expect("acyclic by construction");

        let level_of: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(l, ids)| ids.iter().map(move |id| (id.as_str(), l)))
            .collect();
        prop_assert_eq!(level_of.len(), graph.len());

        for node in graph.nodes() {
            let expected = node
                .needs
                .iter()
                .map(|d| level_of[d.as_str()] + 1)
                .max()
                .unwrap_or(0);
            prop_assert_eq!(level_of[node.id.as_str()], expected);
        }
    }

    #[test]
    fn cycle_detection_agrees_with_petgraph(graph in any_graph_strategy(10)) {
        let report = detect_cycle(&graph);
        prop_assert_eq!(report.has_cycle, is_cyclic_directed(&graph.to_digraph()));

        if report.has_cycle {
            // The reported walk is closed and follows real edges.
            let path = &report.cycle_path;
            prop_assert!(path.len() >= 2);
            prop_assert_eq!(path.first(), path.last());
            for pair in path.windows(2) {
                prop_assert!(
                    graph.dependencies_of(&pair[1]).contains(&pair[0]),
                    "{} -> {} is not an edge", pair[0], pair[1]
                );
            }
        } else {
            prop_assert!(topological_sort(&graph).is_ok());
        }
    }

    #[test]
    fn critical_path_is_consistent(graph in dag_strategy(10)) {
        let cp = critical_path(&graph);
        prop_assert_eq!(cp.slack.len(), graph.len());
        prop_assert!(cp.slack.values().all(|s| *s >= 0.0));
        prop_assert!(!cp.path.is_empty());

        // The chain is a real dependency chain whose durations add up to the
        // project length.
        let total: f64 = cp
            .chain
            .iter()
            .filter_map(|id| graph.node(id))
            .map(|n| n.duration())
            .sum();
        prop_assert!((total - cp.total_duration).abs() < 1e-6);
        for pair in cp.chain.windows(2) {
            prop_assert!(graph.dependencies_of(&pair[1]).contains(&pair[0]));
        }
    }
}
