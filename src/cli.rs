// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `beadflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "beadflow",
    version,
    about = "Analyze, partition and execute dependency graphs of work items.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Beadflow.toml` in the current directory is used when it
    /// exists, otherwise built-in defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BEADFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print topological order, levels, critical path and cycles.
    Analyze {
        /// JSON array of nodes (`id`, `needs`, `weight`, ...).
        graph: PathBuf,
    },

    /// Split a graph into groups with a small weighted cut.
    Partition {
        /// JSON array of nodes, or a full partition request object.
        graph: PathBuf,

        /// Number of groups (ignored for request objects).
        #[arg(long, default_value_t = 2)]
        groups: usize,

        /// JSON file with `keepTogether` / `preserveBoundaries`.
        #[arg(long, value_name = "PATH")]
        constraints: Option<PathBuf>,

        /// Terminal node for a multi-way cut; repeat for each terminal.
        /// When given, replaces the spectral split.
        #[arg(long = "terminal", value_name = "ID")]
        terminals: Vec<String>,
    },

    /// Execute each node's `cmd` in dependency order.
    Run {
        graph: PathBuf,

        /// Override `[scheduler].max_parallel`.
        #[arg(long, value_name = "N")]
        max_parallel: Option<usize>,

        /// Override `[scheduler].step_timeout_ms`.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Cook a formula and print its molecule.
    Formula {
        file: PathBuf,

        /// Variable assignment `name=value`; repeatable.
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
