// tests/graph_analysis.rs

use std::collections::HashSet;
use std::error::Error;

use beadflow::errors::BeadflowError;
use beadflow::graph::{
    Edge, Graph, NodeSpec, StepAction, compute_levels, critical_path, detect_cycle,
    ensure_acyclic, max_parallelism, ready_set, strongly_connected_cycles, topological_sort,
};
use beadflow_test_utils::{GraphBuilder, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn diamond_orders_dependencies_first() -> TestResult {
    init_tracing();
    let graph = GraphBuilder::diamond().build();

    let order = topological_sort(&graph)?;
    assert!(
        order == ["a", "b", "c", "d"] || order == ["a", "c", "b", "d"],
        "unexpected order {order:?}"
    );
    // Ties break by insertion order.
    assert_eq!(order, ["a", "b", "c", "d"]);
    Ok(())
}

#[test]
fn diamond_levels_and_parallelism() -> TestResult {
    let graph = GraphBuilder::diamond().build();

    let levels = compute_levels(&graph)?;
    assert_eq!(
        levels,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ]
    );
    assert_eq!(max_parallelism(&graph)?, 2);
    Ok(())
}

#[test]
fn level_is_one_past_deepest_dependency() -> TestResult {
    // c depends on a (level 0) and b (level 1), so it sits at level 2.
    let graph = GraphBuilder::new()
        .node("a", &[])
        .node("b", &["a"])
        .node("c", &["a", "b"])
        .node("x", &[])
        .build();

    let levels = compute_levels(&graph)?;
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], vec!["a", "x"]);
    assert_eq!(levels[1], vec!["b"]);
    assert_eq!(levels[2], vec!["c"]);
    Ok(())
}

#[test]
fn empty_graph_is_trivially_ordered() -> TestResult {
    let graph = Graph::from_specs(Vec::new())?;
    assert!(topological_sort(&graph)?.is_empty());
    assert!(compute_levels(&graph)?.is_empty());
    assert_eq!(max_parallelism(&graph)?, 0);

    let cp = critical_path(&graph);
    assert!(cp.path.is_empty());
    assert_eq!(cp.total_duration, 0.0);
    Ok(())
}

#[test]
fn three_node_cycle_is_reported_as_closed_walk() {
    let graph = GraphBuilder::new()
        .node("a", &["c"])
        .node("b", &["a"])
        .node("c", &["b"])
        .build();

    let report = detect_cycle(&graph);
    assert!(report.has_cycle);
    assert_eq!(report.cycle_path, vec!["a", "b", "c", "a"]);

    assert_eq!(
        strongly_connected_cycles(&graph),
        vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
    );
}

#[test]
fn self_loop_is_a_cycle() {
    let graph = GraphBuilder::new().node("a", &["a"]).build();

    let report = detect_cycle(&graph);
    assert!(report.has_cycle);
    assert_eq!(report.cycle_path, vec!["a", "a"]);
    assert_eq!(strongly_connected_cycles(&graph), vec![vec!["a".to_string()]]);
}

#[test]
fn ordering_a_cyclic_graph_fails_with_cycle_error() {
    let graph = GraphBuilder::new()
        .node("root", &[])
        .node("x", &["root", "y"])
        .node("y", &["x"])
        .build();

    match topological_sort(&graph) {
        Err(BeadflowError::DependencyCycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"x".to_string()));
            assert!(path.contains(&"y".to_string()));
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
    assert!(compute_levels(&graph).is_err());
    assert!(ensure_acyclic(&graph).is_err());
    assert!(critical_path(&graph).path.is_empty());
}

#[test]
fn cycle_error_message_joins_path() {
    let graph = GraphBuilder::new().node("a", &["b"]).node("b", &["a"]).build();
    let err = ensure_acyclic(&graph).unwrap_err();
    assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
}

#[test]
fn ready_set_follows_completions() {
    let graph = GraphBuilder::diamond().build();

    let mut done = HashSet::new();
    assert_eq!(ready_set(&graph, &done), vec!["a"]);

    done.insert("a".to_string());
    assert_eq!(ready_set(&graph, &done), vec!["b", "c"]);

    done.insert("b".to_string());
    assert_eq!(ready_set(&graph, &done), vec!["c"]);

    done.insert("c".to_string());
    assert_eq!(ready_set(&graph, &done), vec!["d"]);

    done.insert("d".to_string());
    assert!(ready_set(&graph, &done).is_empty());
}

#[test]
fn critical_path_skips_slack_branch() {
    // a(3) -> b(2) -> d(1) is the long branch; c(1) has one unit of slack.
    let graph = GraphBuilder::new()
        .weighted("a", 3.0, &[])
        .weighted("b", 2.0, &["a"])
        .weighted("c", 1.0, &["a"])
        .weighted("d", 1.0, &["b", "c"])
        .build();

    let cp = critical_path(&graph);
    assert_eq!(cp.total_duration, 6.0);
    assert_eq!(cp.path, vec!["a", "b", "d"]);
    assert_eq!(cp.chain, vec!["a", "b", "d"]);
    assert_eq!(cp.slack["a"], 0.0);
    assert_eq!(cp.slack["b"], 0.0);
    assert_eq!(cp.slack["c"], 1.0);
    assert_eq!(cp.slack["d"], 0.0);
}

#[test]
fn critical_path_lists_every_zero_slack_node() {
    // Two independent branches of equal length: all three nodes are
    // critical, but a single chain only follows one branch.
    let graph = GraphBuilder::new()
        .weighted("a", 1.0, &[])
        .weighted("b", 1.0, &["a"])
        .weighted("c", 2.0, &[])
        .build();

    let cp = critical_path(&graph);
    assert_eq!(cp.total_duration, 2.0);
    assert_eq!(cp.path, vec!["a", "b", "c"]);
    assert_eq!(cp.chain, vec!["a", "b"]);
    assert!(cp.slack.values().all(|s| *s == 0.0));
}

#[test]
fn unweighted_nodes_count_as_unit_duration() {
    let graph = GraphBuilder::chain(4).build();
    let cp = critical_path(&graph);
    assert_eq!(cp.total_duration, 4.0);
    assert_eq!(cp.chain, vec!["n0", "n1", "n2", "n3"]);
}

#[test]
fn json_ingestion_reads_camel_case_fields() -> TestResult {
    let graph = Graph::from_json(
        r#"[
            { "id": "fetch", "weight": 2.5 },
            { "id": "build", "needs": ["fetch"], "continueOnError": true, "cmd": "make", "priority": 3 }
        ]"#,
    )?;

    let build = graph.node("build").ok_or("missing build")?;
    assert!(build.meta.continue_on_error);
    assert_eq!(build.meta.priority, 3);
    assert_eq!(
        build.meta.action,
        StepAction::Shell {
            cmd: "make".to_string()
        }
    );
    assert_eq!(graph.node("fetch").map(|n| n.duration()), Some(2.5));
    assert_eq!(graph.dependents_of("fetch"), vec!["build"]);
    assert_eq!(graph.dependencies_of("build"), ["fetch".to_string()]);
    Ok(())
}

#[test]
fn duplicate_needs_collapse_into_one_edge() {
    let graph = GraphBuilder::new().node("a", &[]).node("b", &["a", "a"]).build();
    assert_eq!(graph.edges().len(), 1);
    assert_eq!(graph.dependencies_of("b").len(), 1);
}

#[test]
fn extra_edges_are_dependencies() -> TestResult {
    let graph = GraphBuilder::new()
        .node("a", &[])
        .node("b", &[])
        .edge("a", "b", 4.0)
        .build();
    assert_eq!(topological_sort(&graph)?, vec!["a", "b"]);
    assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
    Ok(())
}

fn structural(result: beadflow::errors::Result<Graph>) -> String {
    match result {
        Err(BeadflowError::Structural(msg)) => msg,
        other => panic!("expected Structural error, got {other:?}"),
    }
}

#[test]
fn malformed_input_is_rejected() {
    let dup = structural(Graph::from_specs(vec![NodeSpec::new("a"), NodeSpec::new("a")]));
    assert!(dup.contains("duplicate node id 'a'"));

    let mut b = NodeSpec::new("b");
    b.needs.push("ghost".to_string());
    let unknown = structural(Graph::from_specs(vec![b]));
    assert!(unknown.contains("unknown node 'ghost'"));

    let mut neg = NodeSpec::new("n");
    neg.weight = Some(-1.0);
    structural(Graph::from_specs(vec![neg]));

    let mut nan = NodeSpec::new("n");
    nan.weight = Some(f64::NAN);
    structural(Graph::from_specs(vec![nan]));

    let empty = structural(Graph::from_specs(vec![NodeSpec::new("  ")]));
    assert!(empty.contains("empty id"));

    structural(Graph::with_edges(
        vec![NodeSpec::new("a"), NodeSpec::new("b")],
        vec![Edge::new("a", "zzz", 1.0)],
    ));
}

#[test]
fn malformed_json_is_a_json_error() {
    assert!(matches!(
        Graph::from_json("{ not json"),
        Err(BeadflowError::Json(_))
    ));
}
