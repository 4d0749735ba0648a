use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beadflow::engine::{StepContext, StepFuture, StepOutput, StepResult, StepRunner};
use beadflow::graph::GraphNode;

#[derive(Default)]
struct FakeState {
    default_latency: Mutex<Duration>,
    latencies: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashSet<String>>,
    panics: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    violations: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// A fake step runner that:
/// - records which steps were started and finished
/// - sleeps for a configurable latency per step
/// - fails or panics on request
/// - records a violation whenever a step starts before all of its
///   dependencies have a successful result in its context
///
/// Clones share all state.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<FakeState>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_latency(self, latency: Duration) -> Self {
        *self.state.default_latency.lock().unwrap() = latency;
        self
    }

    pub fn with_latency(self, id: &str, latency: Duration) -> Self {
        self.state
            .latencies
            .lock()
            .unwrap()
            .insert(id.to_string(), latency);
        self
    }

    pub fn failing(self, id: &str) -> Self {
        self.state.failures.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn panicking(self, id: &str) -> Self {
        self.state.panics.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.state.finished.lock().unwrap().clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.violations.lock().unwrap().clone()
    }

    /// Highest number of steps observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl StepRunner for FakeRunner {
    fn run(&self, node: Arc<GraphNode>, ctx: StepContext) -> StepFuture {
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let id = node.id.clone();
            state.started.lock().unwrap().push(id.clone());

            for dep in &node.needs {
                match ctx.previous_results.get(dep) {
                    Some(r) if r.success => {}
                    _ => state
                        .violations
                        .lock()
                        .unwrap()
                        .push(format!("{id} started before {dep} succeeded")),
                }
            }

            let now = state.running.fetch_add(1, Ordering::SeqCst) + 1;
            state.peak.fetch_max(now, Ordering::SeqCst);

            let latency = {
                let per_node = state.latencies.lock().unwrap().get(&id).copied();
                per_node.unwrap_or(*state.default_latency.lock().unwrap())
            };
            if latency.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(latency).await;
            }

            state.running.fetch_sub(1, Ordering::SeqCst);
            state.finished.lock().unwrap().push(id.clone());

            let should_panic = state.panics.lock().unwrap().contains(&id);
            let should_fail = state.failures.lock().unwrap().contains(&id);
            if should_panic {
                panic!("injected panic in {id}");
            }
            if should_fail {
                return StepResult::failure(id, "injected failure");
            }
            StepResult::success(id.clone(), StepOutput::Text(format!("ran {id}")))
        })
    }
}
