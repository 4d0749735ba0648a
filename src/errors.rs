// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeadflowError {
    /// Malformed graph input: dangling reference, duplicate id, bad weight.
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Step '{node}' failed: {message}")]
    StepExecution { node: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Partition constraint error: {0}")]
    PartitionConstraint(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeadflowError {
    /// Convenience constructor for cycle errors built from node ids.
    pub fn cycle<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BeadflowError::DependencyCycle {
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BeadflowError>;
