// src/engine/mod.rs

//! Parallel execution engine.
//!
//! This module ties together:
//! - the per-run state machine ([`state`]), which owns node statuses and
//!   decides what becomes ready or unsatisfied
//! - the work-stealing ready queue ([`queue`])
//! - cooperative cancellation ([`cancel`])
//! - debounced progress publication ([`progress`])
//! - the async scheduling loop ([`scheduler`]) that dispatches steps to a
//!   pluggable [`StepRunner`](runner::StepRunner)
//!
//! The state machine is pure; all tasks, timers and channels live in the
//! scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

pub mod cancel;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use cancel::CancelToken;
pub use progress::{ExecutionProgress, ProgressEmitter, ResultLog, RunStatus};
pub use queue::{WorkItem, WorkStealingQueue};
pub use runner::{FnRunner, StepFuture, StepRunner, step_fn};
pub use scheduler::Scheduler;

/// Monotonically increasing run identifier, unique per [`Scheduler`].
pub type RunId = u64;

/// Payload produced by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum StepOutput {
    #[default]
    None,
    Text(String),
    Json(serde_json::Value),
}

/// Outcome of running one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub node_id: NodeId,
    pub success: bool,
    #[serde(default)]
    pub output: StepOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time spent in the step, as measured by the scheduler.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl StepResult {
    pub fn success(node_id: impl Into<NodeId>, output: StepOutput) -> Self {
        Self {
            node_id: node_id.into(),
            success: true,
            output,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failure(node_id: impl Into<NodeId>, error: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            success: false,
            output: StepOutput::None,
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    /// Synthetic result for a node whose dependency `failed` did not succeed.
    pub fn unsatisfied(node_id: impl Into<NodeId>, failed: &str) -> Self {
        Self::failure(node_id, format!("dependency not satisfied: {failed}"))
    }
}

/// Read-only view handed to a runner for one step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: RunId,
    /// Fires when the run is cancelled. Runners may use it to stop early.
    pub cancel: CancelToken,
    /// Results of this node's direct dependencies.
    pub previous_results: Arc<BTreeMap<NodeId, StepResult>>,
}

impl StepContext {
    pub fn dependency_result(&self, id: &str) -> Option<&StepResult> {
        self.previous_results.get(id)
    }
}

/// Per-run execution knobs.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum number of steps in flight at once. Must be at least 1.
    pub max_parallel: usize,
    pub step_timeout: Option<Duration>,
    /// Minimum spacing between published progress events.
    pub progress_interval: Duration,
    /// Caller-side cancellation, merged with the run's own token.
    pub cancel: Option<CancelToken>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            step_timeout: None,
            progress_interval: Duration::from_millis(100),
            cancel: None,
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub results: BTreeMap<NodeId, StepResult>,
    /// Node ids in the order their results were recorded.
    pub order: Vec<NodeId>,
    /// Steps that finished after cancellation; their results are not part
    /// of `results`.
    pub discarded: Vec<NodeId>,
    pub progress: ExecutionProgress,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Map the terminal status onto `Result`: a cancelled run becomes
    /// [`BeadflowError::Cancelled`](crate::errors::BeadflowError::Cancelled).
    pub fn into_result(self) -> crate::errors::Result<Self> {
        match self.status {
            RunStatus::Cancelled => Err(crate::errors::BeadflowError::Cancelled),
            _ => Ok(self),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
