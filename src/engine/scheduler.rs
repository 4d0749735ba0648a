// src/engine/scheduler.rs

//! Async scheduling loop.
//!
//! One task per run owns the [`RunState`] and is the only place node
//! statuses change. Steps run as separate tasks in a [`JoinSet`]; the loop
//! reacts to their completion or to cancellation, records results and
//! dispatches whatever became ready.
//!
//! Failure handling:
//! - a failed step whose node has `continue_on_error = false` aborts the
//!   run: nothing new is started, in-flight steps are drained and
//!   `execute` returns [`BeadflowError::StepExecution`];
//! - with `continue_on_error = true` the run goes on, and every transitive
//!   dependent gets a synthetic "dependency not satisfied" result without
//!   being started.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::engine::state::RunState;
use crate::engine::{
    CancelToken, ExecutionOptions, ExecutionProgress, ExecutionReport, ProgressEmitter, RunId,
    RunStatus, StepContext, StepResult, StepRunner, WorkItem, WorkStealingQueue,
};
use crate::errors::{BeadflowError, Result};
use crate::graph::{Graph, GraphNode, NodeId, detect_cycle};

/// Buffered progress events per broadcast channel.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct RunEntry {
    cancel: CancelToken,
    snapshot: ExecutionProgress,
    events: broadcast::Sender<ExecutionProgress>,
}

#[derive(Debug)]
struct Shared {
    next_run_id: AtomicU64,
    runs: Mutex<HashMap<RunId, RunEntry>>,
    all_events: broadcast::Sender<ExecutionProgress>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            next_run_id: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
            all_events: broadcast::channel(EVENT_CAPACITY).0,
        }
    }
}

/// Executes graphs with bounded parallelism and keeps a registry of runs.
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

/// Handle to a run started with [`Scheduler::spawn`].
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: RunId,
    /// Subscribed before the first step starts, so no event is missed.
    pub events: broadcast::Receiver<ExecutionProgress>,
    pub handle: JoinHandle<Result<ExecutionReport>>,
}

struct PreparedRun {
    run_id: RunId,
    graph: Arc<Graph>,
    cancel: CancelToken,
    options: ExecutionOptions,
    emitter: ProgressEmitter,
}

struct Finished {
    index: usize,
    worker: usize,
    result: StepResult,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `graph` to completion (or cancellation) and return its report.
    pub async fn execute<R>(
        &self,
        graph: impl Into<Arc<Graph>>,
        runner: R,
        options: ExecutionOptions,
    ) -> Result<ExecutionReport>
    where
        R: StepRunner + 'static,
    {
        let prepared = self.prepare(graph.into(), options)?;
        self.drive(prepared, Arc::new(runner)).await
    }

    /// Like [`execute`](Self::execute) but runs in the background.
    pub fn spawn<R>(
        &self,
        graph: impl Into<Arc<Graph>>,
        runner: R,
        options: ExecutionOptions,
    ) -> Result<RunTicket>
    where
        R: StepRunner + 'static,
    {
        let prepared = self.prepare(graph.into(), options)?;
        let run_id = prepared.run_id;
        let events = self
            .subscribe(run_id)
            .ok_or_else(|| BeadflowError::Other(anyhow!("run {run_id} vanished from registry")))?;

        let scheduler = self.clone();
        let runner: Arc<dyn StepRunner> = Arc::new(runner);
        let handle = tokio::spawn(async move { scheduler.drive(prepared, runner).await });

        Ok(RunTicket {
            run_id,
            events,
            handle,
        })
    }

    /// Request cancellation of a run. Returns false for unknown or finished runs.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let runs = self.runs();
        match runs.get(&run_id) {
            Some(entry) if !entry.snapshot.status.is_terminal() => {
                info!(run_id, "cancellation requested");
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Latest (undebounced) snapshot of a run.
    pub fn progress(&self, run_id: RunId) -> Option<ExecutionProgress> {
        self.runs().get(&run_id).map(|entry| entry.snapshot.clone())
    }

    /// Debounced progress events of one run.
    pub fn subscribe(&self, run_id: RunId) -> Option<broadcast::Receiver<ExecutionProgress>> {
        self.runs().get(&run_id).map(|entry| entry.events.subscribe())
    }

    /// Debounced progress events of every run started after this call.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.shared.all_events.subscribe()
    }

    /// Runs that have not reached a terminal status, ascending.
    pub fn active_runs(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self
            .runs()
            .iter()
            .filter(|(_, entry)| !entry.snapshot.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop a finished run from the registry.
    pub fn forget(&self, run_id: RunId) -> bool {
        let mut runs = self.runs();
        match runs.get(&run_id) {
            Some(entry) if entry.snapshot.status.is_terminal() => {
                runs.remove(&run_id);
                true
            }
            _ => false,
        }
    }

    fn prepare(&self, graph: Arc<Graph>, options: ExecutionOptions) -> Result<PreparedRun> {
        if options.max_parallel == 0 {
            return Err(BeadflowError::Config(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        detect_cycle(&graph).into_result()?;

        let run_id = self.shared.next_run_id.fetch_add(1, Ordering::SeqCst);
        let sources: Vec<&CancelToken> = options.cancel.iter().collect();
        let cancel = CancelToken::merge(&sources);

        let mut snapshot = ExecutionProgress::new(run_id, graph.len());
        snapshot.status = RunStatus::Running;

        let events = broadcast::channel(EVENT_CAPACITY).0;
        let emitter = ProgressEmitter::spawn(
            options.progress_interval,
            vec![events.clone(), self.shared.all_events.clone()],
        );

        self.runs().insert(
            run_id,
            RunEntry {
                cancel: cancel.clone(),
                snapshot,
                events,
            },
        );

        info!(
            run_id,
            nodes = graph.len(),
            max_parallel = options.max_parallel,
            "run registered"
        );

        Ok(PreparedRun {
            run_id,
            graph,
            cancel,
            options,
            emitter,
        })
    }

    async fn drive(
        &self,
        prepared: PreparedRun,
        runner: Arc<dyn StepRunner>,
    ) -> Result<ExecutionReport> {
        let PreparedRun {
            run_id,
            graph,
            cancel,
            options,
            emitter,
        } = prepared;

        let mut state = RunState::new(graph.clone());
        let mut progress = ExecutionProgress::new(run_id, graph.len());
        progress.status = RunStatus::Running;

        let mut queue: WorkStealingQueue<WorkItem> = WorkStealingQueue::new(options.max_parallel);
        let mut idle: BTreeSet<usize> = (0..queue.worker_count()).collect();
        let mut in_flight: JoinSet<Finished> = JoinSet::new();

        let mut cancelled = false;
        let mut abort: Option<BeadflowError> = None;
        let mut discarded: Vec<NodeId> = Vec::new();

        let ready = state.collect_ready();
        enqueue(&mut queue, &state, run_id, &cancel, ready);

        loop {
            while abort.is_none() && !cancelled {
                if cancel.is_cancelled() {
                    cancelled = true;
                    info!(run_id, "run cancelled before dispatch");
                    break;
                }
                let Some(&worker) = idle.first() else {
                    break;
                };
                let Some(item) = queue.pop(worker) else {
                    break;
                };
                let Some(index) = graph.index_of(&item.node_id) else {
                    continue;
                };
                if !state.mark_running(index) {
                    continue;
                }

                idle.remove(&worker);
                progress.current_step = Some(item.node_id.clone());
                debug!(run_id, node = %item.node_id, worker, "dispatching step");

                spawn_step(
                    &mut in_flight,
                    &runner,
                    Arc::new(graph.nodes()[index].clone()),
                    index,
                    worker,
                    item.context,
                    options.step_timeout,
                );
            }

            self.publish(run_id, &emitter, &progress);

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!(
                        run_id,
                        in_flight = in_flight.len(),
                        "run cancelled; waiting for started steps"
                    );
                }

                joined = in_flight.join_next() => {
                    let finished = match joined {
                        Some(Ok(finished)) => finished,
                        Some(Err(err)) => {
                            error!(run_id, error = %err, "step task failed");
                            if abort.is_none() {
                                abort = Some(BeadflowError::Other(anyhow!("step task failed: {err}")));
                            }
                            continue;
                        }
                        None => continue,
                    };
                    idle.insert(finished.worker);

                    if cancelled {
                        debug!(
                            run_id,
                            node = %finished.result.node_id,
                            "discarding result of step finished after cancellation"
                        );
                        discarded.push(finished.result.node_id);
                        continue;
                    }

                    if let Some(err) = complete_step(&mut state, &mut progress, &mut queue, run_id, &cancel, finished) {
                        if abort.is_none() {
                            abort = Some(err);
                        }
                    }
                }
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if abort.is_some() || state.failed_count() > 0 {
            RunStatus::Failed
        } else if state.all_terminal() {
            RunStatus::Completed
        } else {
            error!(run_id, "run stalled with unfinished nodes");
            RunStatus::Failed
        };
        progress.status = status;

        self.publish_final(run_id, &progress);
        emitter.finish(progress.clone()).await;

        info!(
            run_id,
            status = ?status,
            completed = progress.completed,
            failed = progress.failed,
            discarded = discarded.len(),
            "run finished"
        );

        if let Some(err) = abort {
            return Err(err);
        }

        let (results, order) = state.into_parts();
        Ok(ExecutionReport {
            run_id,
            status,
            results,
            order,
            discarded,
            progress,
        })
    }

    fn publish(&self, run_id: RunId, emitter: &ProgressEmitter, progress: &ExecutionProgress) {
        if let Some(entry) = self.runs().get_mut(&run_id) {
            entry.snapshot = progress.clone();
        }
        emitter.update(progress.clone());
    }

    fn publish_final(&self, run_id: RunId, progress: &ExecutionProgress) {
        if let Some(entry) = self.runs().get_mut(&run_id) {
            entry.snapshot = progress.clone();
        }
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, RunEntry>> {
        self.shared
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turn newly ready nodes into work items, highest priority first.
fn enqueue(
    queue: &mut WorkStealingQueue<WorkItem>,
    state: &RunState,
    run_id: RunId,
    cancel: &CancelToken,
    mut ready: Vec<usize>,
) {
    let graph = state.graph();
    ready.sort_by_key(|&i| (Reverse(graph.nodes()[i].meta.priority), i));

    for i in ready {
        let node = &graph.nodes()[i];
        let item = WorkItem {
            node_id: node.id.clone(),
            priority: node.meta.priority,
            context: StepContext {
                run_id,
                cancel: cancel.clone(),
                previous_results: Arc::new(state.dependency_results(i)),
            },
        };
        let worker = queue.push(item);
        debug!(run_id, node = %node.id, worker, "step ready");
    }
}

/// Record a finished step. Returns the error that aborts the run, if any.
fn complete_step(
    state: &mut RunState,
    progress: &mut ExecutionProgress,
    queue: &mut WorkStealingQueue<WorkItem>,
    run_id: RunId,
    cancel: &CancelToken,
    finished: Finished,
) -> Option<BeadflowError> {
    let Finished { index, result, .. } = finished;
    let graph = state.graph().clone();
    let node = &graph.nodes()[index];
    let duration_ms = result.duration.as_millis() as u64;

    if result.success {
        info!(run_id, node = %node.id, duration_ms, "step completed");
        progress.record(result.clone());
        let ready = state.record_success(index, result);
        enqueue(queue, state, run_id, cancel, ready);
        return None;
    }

    let message = result
        .error
        .clone()
        .unwrap_or_else(|| "step failed".to_string());
    warn!(run_id, node = %node.id, duration_ms, error = %message, "step failed");

    progress.record(result.clone());
    for synthetic in state.record_failure(index, result) {
        progress.record(synthetic);
    }

    if node.meta.continue_on_error {
        debug!(run_id, node = %node.id, "continue_on_error set; run goes on");
        None
    } else {
        error!(run_id, node = %node.id, "step failure aborts the run");
        Some(BeadflowError::StepExecution {
            node: node.id.clone(),
            message,
        })
    }
}

fn spawn_step(
    set: &mut JoinSet<Finished>,
    runner: &Arc<dyn StepRunner>,
    node: Arc<GraphNode>,
    index: usize,
    worker: usize,
    ctx: StepContext,
    timeout: Option<Duration>,
) {
    let run_id = ctx.run_id;
    let fut = runner.run(node.clone(), ctx);

    set.spawn(async move {
        let started = Instant::now();
        // The step runs in its own task so a panic surfaces as a JoinError
        // we can attribute to this node.
        let mut handle = tokio::spawn(fut);

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!(
                        run_id,
                        node = %node.id,
                        timeout_ms = limit.as_millis() as u64,
                        "step timed out"
                    );
                    Ok(StepResult::failure(
                        node.id.clone(),
                        format!("step timed out after {} ms", limit.as_millis()),
                    ))
                }
            },
            None => (&mut handle).await,
        };

        let mut result = match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => StepResult::failure(node.id.clone(), "step panicked"),
            Err(err) => StepResult::failure(node.id.clone(), format!("step aborted: {err}")),
        };
        result.node_id = node.id.clone();
        result.duration = started.elapsed();

        Finished {
            index,
            worker,
            result,
        }
    });
}
