// src/exec/mod.rs

//! Process-backed step execution.
//!
//! [`CommandRunner`] is the production [`StepRunner`](crate::engine::StepRunner):
//! it runs a node's shell command and maps the exit status onto a
//! [`StepResult`](crate::engine::StepResult).

pub mod command;

pub use command::CommandRunner;
