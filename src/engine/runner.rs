// src/engine/runner.rs

//! Pluggable step execution.
//!
//! The scheduler talks to a `StepRunner` instead of running anything
//! itself. Production code uses [`CommandRunner`](crate::exec::CommandRunner);
//! tests provide runners that record calls and simulate latency or failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::engine::{StepContext, StepResult};
use crate::graph::GraphNode;

/// Future returned by a runner. It is spawned onto the runtime, so it owns
/// everything it needs.
pub type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send + 'static>>;

/// Trait abstracting how a single node is executed.
///
/// Implementations report failure through [`StepResult::failure`] rather
/// than panicking; a panic is still caught and recorded as a failed step.
pub trait StepRunner: Send + Sync {
    fn run(&self, node: Arc<GraphNode>, ctx: StepContext) -> StepFuture;
}

impl<R: StepRunner + ?Sized> StepRunner for Arc<R> {
    fn run(&self, node: Arc<GraphNode>, ctx: StepContext) -> StepFuture {
        (**self).run(node, ctx)
    }
}

/// Adapts an async closure into a [`StepRunner`].
pub struct FnRunner<F> {
    f: F,
}

impl<F, Fut> StepRunner for FnRunner<F>
where
    F: Fn(Arc<GraphNode>, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn run(&self, node: Arc<GraphNode>, ctx: StepContext) -> StepFuture {
        Box::pin((self.f)(node, ctx))
    }
}

/// ```ignore
/// let runner = step_fn(|node, _ctx| async move {
///     StepResult::success(node.id.clone(), StepOutput::None)
/// });
/// ```
pub fn step_fn<F, Fut>(f: F) -> FnRunner<F>
where
    F: Fn(Arc<GraphNode>, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    FnRunner { f }
}
