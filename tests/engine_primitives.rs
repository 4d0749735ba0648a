// tests/engine_primitives.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use beadflow::engine::state::RunState;
use beadflow::engine::{
    CancelToken, ExecutionProgress, ProgressEmitter, ResultLog, RunStatus, StepOutput,
    StepResult, WorkStealingQueue,
};
use beadflow::graph::NodeStatus;
use beadflow_test_utils::{GraphBuilder, NodeSpecBuilder, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn queue_spreads_work_and_steals_from_the_back() {
    let mut q = WorkStealingQueue::new(2);
    assert_eq!(q.push("a"), 0);
    assert_eq!(q.push("b"), 1);
    assert_eq!(q.push("c"), 0);
    assert_eq!(q.push("d"), 1);
    assert_eq!(q.push("e"), 0);
    assert_eq!(q.len(), 5);
    assert_eq!(q.queue_len(0), 3);

    // Worker 1 drains its own queue from the front...
    assert_eq!(q.pop(1), Some("b"));
    assert_eq!(q.pop(1), Some("d"));
    // ...then steals the newest item from worker 0.
    assert_eq!(q.pop(1), Some("e"));
    assert_eq!(q.pop(0), Some("a"));
    assert_eq!(q.pop(0), Some("c"));
    assert!(q.is_empty());
    assert_eq!(q.pop(0), None);
    assert_eq!(q.steal(1), None);
}

#[test]
fn queue_has_at_least_one_worker() {
    let mut q = WorkStealingQueue::new(0);
    assert_eq!(q.worker_count(), 1);
    q.push(1);
    assert_eq!(q.pop(0), Some(1));
}

#[test]
fn steal_prefers_the_longest_queue() {
    let mut q = WorkStealingQueue::new(3);
    for i in 0..4 {
        q.push(i);
    }
    // Queues: [0, 3], [1], [2]. Worker 2 drains its own item, then steals
    // from queue 0 which is the longest.
    assert_eq!(q.pop(2), Some(2));
    assert_eq!(q.pop(2), Some(3));
}

#[tokio::test]
async fn cancel_token_wakes_waiters() -> TestResult {
    let token = CancelToken::new();
    let waiter = {
        let token = token.clone();
        tokio::spawn(async move { token.cancelled().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!token.is_cancelled());
    token.cancel();
    token.cancel();

    with_timeout(waiter).await?;
    assert!(token.is_cancelled());
    // Already fired: resolves immediately.
    with_timeout(token.cancelled()).await;
    Ok(())
}

#[test]
fn child_follows_parent_but_not_the_reverse() {
    let parent = CancelToken::new();
    let child = parent.child();
    let sibling = parent.child();

    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());
    assert!(!sibling.is_cancelled());

    parent.cancel();
    assert!(sibling.is_cancelled());

    // Children of a cancelled token start cancelled.
    assert!(parent.child().is_cancelled());
}

#[test]
fn merged_token_fires_on_any_source() {
    let a = CancelToken::new();
    let b = CancelToken::new();
    let merged = CancelToken::merge(&[&a, &b]);
    assert!(!merged.is_cancelled());

    b.cancel();
    assert!(merged.is_cancelled());
    assert!(!a.is_cancelled());

    let empty = CancelToken::merge(&[]);
    assert!(!empty.is_cancelled());
}

#[test]
fn run_state_promotes_dependents_on_success() {
    let mut state = RunState::new(Arc::new(GraphBuilder::diamond().build()));

    assert_eq!(state.collect_ready(), vec![0]);
    assert_eq!(state.status_of("a"), Some(NodeStatus::Ready));
    assert!(state.mark_running(0));
    assert!(!state.mark_running(0), "running twice must be refused");
    assert!(!state.mark_running(3), "d is not ready yet");

    let ready = state.record_success(0, StepResult::success("a", StepOutput::None));
    assert_eq!(ready, vec![1, 2]);
    assert!(state.deps_satisfied(1));
    assert!(!state.deps_satisfied(3));
    assert_eq!(state.dependency_results(1).len(), 1);

    assert!(state.mark_running(1));
    assert!(state.mark_running(2));
    assert!(state.record_success(1, StepResult::success("b", StepOutput::None)).is_empty());
    assert_eq!(
        state.record_success(2, StepResult::success("c", StepOutput::None)),
        vec![3]
    );

    assert!(state.mark_running(3));
    state.record_success(3, StepResult::success("d", StepOutput::None));
    assert!(state.all_terminal());
    assert_eq!(state.completed_count(), 4);
    assert_eq!(state.order(), ["a", "b", "c", "d"]);
}

#[test]
fn run_state_fails_transitive_dependents_once() {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("root").continue_on_error().build())
        .node("mid", &["root"])
        .node("leaf", &["mid", "root"])
        .node("other", &[])
        .build();
    let mut state = RunState::new(Arc::new(graph));

    assert_eq!(state.collect_ready(), vec![0, 3]);
    state.mark_running(0);

    let synthetic = state.record_failure(0, StepResult::failure("root", "boom"));
    let ids: Vec<&str> = synthetic.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(synthetic.len(), 2);
    assert!(ids.contains(&"mid"));
    assert!(ids.contains(&"leaf"));
    assert!(synthetic.iter().all(|r| !r.success));
    assert_eq!(state.status_of("leaf"), Some(NodeStatus::Failed));
    assert_eq!(state.status_of("other"), Some(NodeStatus::Ready));

    // A second result for the same node is ignored.
    assert!(
        state
            .record_failure(0, StepResult::failure("root", "again"))
            .is_empty()
    );
    assert_eq!(state.result("root").and_then(|r| r.error.as_deref()), Some("boom"));
    assert_eq!(state.failed_count(), 3);
    assert!(!state.all_terminal());
}

#[test]
fn progress_percent_tracks_recorded_results() {
    let mut progress = ExecutionProgress::new(7, 4);
    assert_eq!(progress.status, RunStatus::Pending);
    assert_eq!(progress.percent, 0.0);

    progress.record(StepResult::success("a", StepOutput::None));
    progress.record(StepResult::failure("b", "nope"));
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.percent, 50.0);

    assert_eq!(ExecutionProgress::new(1, 0).percent, 100.0);
}

#[test]
fn progress_snapshots_keep_their_own_prefix() {
    let mut progress = ExecutionProgress::new(2, 3);
    progress.record(StepResult::success("a", StepOutput::None));
    let early = progress.clone();

    progress.record(StepResult::success("b", StepOutput::None));
    assert!(early.results.shares_storage_with(&progress.results));
    assert_eq!(early.results.len(), 1);
    assert_eq!(progress.results.len(), 2);
    assert_eq!(early.results.get(1), None);
    assert_eq!(progress.results.get(1).map(|r| r.node_id), Some("b".to_string()));
    assert_ne!(early, progress);

    // Recording on a stale snapshot forks it instead of clobbering "b".
    let mut fork = early.clone();
    fork.record(StepResult::failure("c", "boom"));
    assert!(!fork.results.shares_storage_with(&progress.results));
    let ids: Vec<String> = fork.results.to_vec().into_iter().map(|r| r.node_id).collect();
    assert_eq!(ids, vec!["a", "c"]);
    let ids: Vec<String> = progress.results.to_vec().into_iter().map(|r| r.node_id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn result_logs_compare_by_content() -> TestResult {
    let entries = vec![StepResult::success("a", StepOutput::None)];
    let mut shared = ResultLog::new();
    shared.push(entries[0].clone());
    let copied = ResultLog::from(entries);

    assert!(!shared.shares_storage_with(&copied));
    assert_eq!(shared, copied);
    assert!(ResultLog::new().is_empty());

    let back: ResultLog = serde_json::from_value(serde_json::to_value(&shared)?)?;
    assert_eq!(back, shared);
    Ok(())
}

#[test]
fn progress_serializes_in_camel_case() -> TestResult {
    let mut progress = ExecutionProgress::new(3, 1);
    progress.current_step = Some("a".to_string());
    progress.record(StepResult::success("a", StepOutput::Text("hi".to_string())));

    let json = serde_json::to_value(&progress)?;
    assert_eq!(json["runId"], 3);
    assert_eq!(json["currentStep"], "a");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["results"][0]["nodeId"], "a");
    assert_eq!(json["results"][0]["output"]["kind"], "text");
    assert_eq!(json["results"][0]["duration"], 0);
    Ok(())
}

#[tokio::test]
async fn emitter_coalesces_bursts_and_flushes_final_state() -> TestResult {
    let (tx, mut rx) = broadcast::channel(64);
    let emitter = ProgressEmitter::spawn(Duration::from_millis(50), vec![tx]);

    let mut progress = ExecutionProgress::new(1, 100);
    progress.status = RunStatus::Running;
    for i in 0..100 {
        progress.record(StepResult::success(format!("n{i}"), StepOutput::None));
        emitter.update(progress.clone());
    }

    let mut last = progress.clone();
    last.status = RunStatus::Completed;
    with_timeout(emitter.finish(last.clone())).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    // A burst of 100 updates collapses to a handful of publications.
    assert!(events.len() < 10, "{} events published", events.len());
    assert_eq!(events.last(), Some(&last));
    assert_eq!(
        events.iter().filter(|e| e.status.is_terminal()).count(),
        1
    );
    Ok(())
}
