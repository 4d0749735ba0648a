// src/exec/command.rs

//! Shell command step runner.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::{StepContext, StepFuture, StepOutput, StepResult, StepRunner};
use crate::graph::{GraphNode, StepAction};

/// Runs `sh -c <cmd>` (`cmd /C` on Windows) for nodes with a shell action.
///
/// - stdout is captured and returned as [`StepOutput::Text`]
/// - stderr is streamed to the log at debug level
/// - nodes without a command succeed immediately
/// - if the run is cancelled while the process is alive, it is killed
///
/// The kill is this runner's own choice. The scheduler never aborts a
/// started step on cancellation; it only stops dispatching and discards
/// late results. A runner that must leave its work running should ignore
/// [`StepContext::cancel`] instead.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    /// Working directory for spawned processes; inherits ours when unset.
    pub cwd: Option<std::path::PathBuf>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(cwd: impl Into<std::path::PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

impl StepRunner for CommandRunner {
    fn run(&self, node: Arc<GraphNode>, ctx: StepContext) -> StepFuture {
        let cwd = self.cwd.clone();
        Box::pin(async move {
            let cmd = match &node.meta.action {
                StepAction::Noop => {
                    debug!(node = %node.id, run_id = ctx.run_id, "no command; nothing to run");
                    return StepResult::success(node.id.clone(), StepOutput::None);
                }
                StepAction::Shell { cmd } => cmd.clone(),
            };

            match run_command(&node, &cmd, cwd.as_deref(), &ctx).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(node = %node.id, run_id = ctx.run_id, error = %err, "step execution error");
                    StepResult::failure(node.id.clone(), format!("{err:#}"))
                }
            }
        })
    }
}

async fn run_command(
    node: &GraphNode,
    cmd: &str,
    cwd: Option<&std::path::Path>,
    ctx: &StepContext,
) -> Result<StepResult> {
    info!(node = %node.id, run_id = ctx.run_id, cmd = %cmd, "starting step process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for step '{}'", node.id))?;

    // Drain both pipes concurrently so neither buffer fills up.
    let stdout_task = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).await.map(|_| buf)
        })
    });
    if let Some(stderr) = child.stderr.take() {
        let node_id = node.id.clone();
        let run_id = ctx.run_id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(node = %node_id, run_id, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of step '{}'", node.id))?;
            let code = status.code().unwrap_or(-1);

            let stdout = match stdout_task {
                Some(task) => task
                    .await
                    .context("joining stdout reader")?
                    .context("reading stdout")?,
                None => String::new(),
            };

            info!(
                node = %node.id,
                run_id = ctx.run_id,
                exit_code = code,
                success = status.success(),
                "step process exited"
            );

            if status.success() {
                let output = if stdout.is_empty() {
                    StepOutput::None
                } else {
                    StepOutput::Text(stdout)
                };
                Ok(StepResult::success(node.id.clone(), output))
            } else {
                let mut result =
                    StepResult::failure(node.id.clone(), format!("exit code {code}"));
                if !stdout.is_empty() {
                    result.output = StepOutput::Text(stdout);
                }
                Ok(result)
            }
        }

        _ = ctx.cancel.cancelled() => {
            info!(
                node = %node.id,
                run_id = ctx.run_id,
                "run cancelled; killing step process"
            );
            if let Err(e) = child.kill().await {
                warn!(node = %node.id, run_id = ctx.run_id, error = %e, "failed to kill step process");
            }
            Ok(StepResult::failure(node.id.clone(), "cancelled"))
        }
    }
}
