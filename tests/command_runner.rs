// tests/command_runner.rs
#![cfg(unix)]

use std::error::Error;
use std::time::{Duration, Instant};

use beadflow::engine::{
    CancelToken, ExecutionOptions, RunStatus, Scheduler, StepOutput, StepRunner,
};
use beadflow::errors::BeadflowError;
use beadflow::exec::CommandRunner;
use beadflow_test_utils::{GraphBuilder, NodeSpecBuilder, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn options() -> ExecutionOptions {
    ExecutionOptions {
        max_parallel: 2,
        progress_interval: Duration::from_millis(5),
        ..ExecutionOptions::default()
    }
}

#[tokio::test]
async fn shell_steps_capture_stdout() -> TestResult {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("hello").cmd("echo hello").build())
        .spec(NodeSpecBuilder::new("quiet").needs(&["hello"]).build())
        .build();

    let report = with_timeout(Scheduler::new().execute(graph, CommandRunner::new(), options())).await?;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.results["hello"].output,
        StepOutput::Text("hello\n".to_string())
    );
    // No command: nothing to run.
    assert_eq!(report.results["quiet"].output, StepOutput::None);
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_a_failure() -> TestResult {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("bad").cmd("echo partial; exit 3").build())
        .build();

    match with_timeout(Scheduler::new().execute(graph, CommandRunner::new(), options())).await {
        Err(BeadflowError::StepExecution { node, message }) => {
            assert_eq!(node, "bad");
            assert_eq!(message, "exit code 3");
        }
        other => panic!("expected StepExecution error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn working_directory_is_applied() -> TestResult {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "found")?;

    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("cat").cmd("cat marker.txt").build())
        .build();
    let report =
        with_timeout(Scheduler::new().execute(graph, CommandRunner::with_cwd(dir.path()), options()))
            .await?;

    assert_eq!(
        report.results["cat"].output,
        StepOutput::Text("found".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_the_process() -> TestResult {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("sleepy").cmd("sleep 30").build())
        .build();
    let cancel = CancelToken::new();
    let opts = ExecutionOptions {
        cancel: Some(cancel.clone()),
        ..options()
    };

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = with_timeout(Scheduler::new().execute(graph, CommandRunner::new(), opts)).await?;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.discarded, vec!["sleepy"]);
    Ok(())
}

#[tokio::test]
async fn runner_can_be_called_directly() -> TestResult {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("direct").cmd("printf ok").build())
        .build();
    let node = std::sync::Arc::new(graph.nodes()[0].clone());
    let ctx = beadflow::engine::StepContext {
        run_id: 0,
        cancel: CancelToken::new(),
        previous_results: Default::default(),
    };

    let result = with_timeout(CommandRunner::new().run(node, ctx)).await;
    assert!(result.success);
    assert_eq!(result.output, StepOutput::Text("ok".to_string()));
    Ok(())
}

#[tokio::test]
async fn runner_kills_its_process_on_cancel_without_a_scheduler() -> TestResult {
    let graph = GraphBuilder::new()
        .spec(NodeSpecBuilder::new("sleepy").cmd("sleep 30").build())
        .build();
    let node = std::sync::Arc::new(graph.nodes()[0].clone());
    let cancel = CancelToken::new();
    let ctx = beadflow::engine::StepContext {
        run_id: 0,
        cancel: cancel.clone(),
        previous_results: Default::default(),
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let result = with_timeout(CommandRunner::new().run(node, ctx)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    Ok(())
}
