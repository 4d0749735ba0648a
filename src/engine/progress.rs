// src/engine/progress.rs

//! Run progress snapshots and their debounced publication.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::{RunId, StepResult};
use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// `(completed + failed) / total * 100`; 100 for an empty graph.
    pub percent: f64,
    /// Recorded results, in recording order.
    pub results: ResultLog,
    /// Most recently started step.
    pub current_step: Option<NodeId>,
}

impl ExecutionProgress {
    pub fn new(run_id: RunId, total: usize) -> Self {
        let mut progress = Self {
            run_id,
            status: RunStatus::Pending,
            total,
            completed: 0,
            failed: 0,
            percent: 0.0,
            results: ResultLog::new(),
            current_step: None,
        };
        progress.refresh_percent();
        progress
    }

    pub fn record(&mut self, result: StepResult) {
        if result.success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
        self.refresh_percent();
    }

    fn refresh_percent(&mut self) {
        self.percent = if self.total == 0 {
            100.0
        } else {
            (self.completed + self.failed) as f64 / self.total as f64 * 100.0
        };
    }
}

/// Append-only result list whose clones share storage.
///
/// A clone is O(1) and keeps seeing exactly the entries that existed when
/// it was taken, so a running scheduler can hand out snapshots on every
/// step without copying the history. Pushing onto a clone that has fallen
/// behind the shared storage forks it first.
#[derive(Debug, Clone, Default)]
pub struct ResultLog {
    shared: Arc<RwLock<Vec<StepResult>>>,
    len: usize,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, result: StepResult) {
        {
            let mut entries = write(&self.shared);
            if entries.len() == self.len {
                entries.push(result);
                self.len += 1;
                return;
            }
        }
        let mut forked = read(&self.shared)[..self.len].to_vec();
        forked.push(result);
        self.len = forked.len();
        self.shared = Arc::new(RwLock::new(forked));
    }

    pub fn get(&self, index: usize) -> Option<StepResult> {
        if index >= self.len {
            return None;
        }
        read(&self.shared).get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<StepResult> {
        read(&self.shared)[..self.len].to_vec()
    }

    /// `true` if both logs are views onto the same storage.
    pub fn shares_storage_with(&self, other: &ResultLog) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl From<Vec<StepResult>> for ResultLog {
    fn from(entries: Vec<StepResult>) -> Self {
        Self {
            len: entries.len(),
            shared: Arc::new(RwLock::new(entries)),
        }
    }
}

impl PartialEq for ResultLog {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        // Same storage and length means the same prefix.
        if self.shares_storage_with(other) {
            return true;
        }
        read(&self.shared)[..self.len] == read(&other.shared)[..other.len]
    }
}

impl Serialize for ResultLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(read(&self.shared)[..self.len].iter())
    }
}

impl<'de> Deserialize<'de> for ResultLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<StepResult>::deserialize(deserializer).map(ResultLog::from)
    }
}

fn read(lock: &RwLock<Vec<StepResult>>) -> RwLockReadGuard<'_, Vec<StepResult>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<Vec<StepResult>>) -> RwLockWriteGuard<'_, Vec<StepResult>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

enum EmitterMsg {
    Update(ExecutionProgress),
    Finish(ExecutionProgress, oneshot::Sender<()>),
}

/// Coalesces progress updates to at most one publication per interval.
///
/// Updates are fed through an unbounded channel to a background task which
/// remembers only the latest one. The terminal state is published by
/// [`finish`](Self::finish), exactly once, after any pending update is
/// dropped.
#[derive(Debug)]
pub struct ProgressEmitter {
    tx: mpsc::UnboundedSender<EmitterMsg>,
    handle: JoinHandle<()>,
}

impl ProgressEmitter {
    /// Publish onto every sender in `sinks`.
    pub fn spawn(interval: Duration, sinks: Vec<broadcast::Sender<ExecutionProgress>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(emitter_loop(interval, rx, sinks));
        Self { tx, handle }
    }

    pub fn update(&self, progress: ExecutionProgress) {
        if self.tx.send(EmitterMsg::Update(progress)).is_err() {
            debug!("progress emitter already stopped; dropping update");
        }
    }

    /// Publish `last` and stop. Returns once it has been handed to the
    /// broadcast channels.
    pub async fn finish(self, last: ExecutionProgress) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(EmitterMsg::Finish(last, ack_tx)).is_err() {
            warn!("progress emitter stopped before the final flush");
            return;
        }
        let _ = ack_rx.await;
        if let Err(err) = self.handle.await {
            warn!(error = %err, "progress emitter task failed");
        }
    }
}

async fn emitter_loop(
    interval: Duration,
    mut rx: mpsc::UnboundedReceiver<EmitterMsg>,
    sinks: Vec<broadcast::Sender<ExecutionProgress>>,
) {
    let publish = |progress: ExecutionProgress| {
        for sink in &sinks {
            // No subscribers is fine.
            let _ = sink.send(progress.clone());
        }
    };

    let mut pending: Option<ExecutionProgress> = None;
    let mut last_emit: Option<Instant> = None;

    loop {
        let due = last_emit.map_or_else(Instant::now, |at| at + interval);

        tokio::select! {
            msg = rx.recv() => match msg {
                Some(EmitterMsg::Update(progress)) => {
                    pending = Some(progress);
                }
                Some(EmitterMsg::Finish(last, ack)) => {
                    publish(last);
                    let _ = ack.send(());
                    break;
                }
                None => {
                    if let Some(progress) = pending.take() {
                        publish(progress);
                    }
                    break;
                }
            },
            _ = tokio::time::sleep_until(due), if pending.is_some() => {
                if let Some(progress) = pending.take() {
                    publish(progress);
                    last_emit = Some(Instant::now());
                }
            }
        }
    }

    debug!("progress emitter stopped");
}
