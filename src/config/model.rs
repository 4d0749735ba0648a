// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::engine::ExecutionOptions;
use crate::partition::SpectralOptions;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// max_parallel = 8
/// step_timeout_ms = 30000
/// progress_interval_ms = 100
///
/// [cache]
/// capacity = 128
/// ttl_secs = 600
///
/// [partition]
/// iterations = 50
/// seed = 42
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    #[serde(default)]
    pub cache: RawCacheSection,

    #[serde(default)]
    pub partition: RawPartitionSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSchedulerSection {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-step timeout; unset means steps may run forever.
    #[serde(default)]
    pub step_timeout_ms: Option<u64>,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_max_parallel() -> usize {
    4
}

fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            step_timeout_ms: None,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// `[cache]` section (cooked formula cache).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_capacity() -> usize {
    128
}

fn default_ttl_secs() -> u64 {
    600
}

impl Default for RawCacheSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// `[partition]` section (spectral partitioning).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPartitionSection {
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_iterations() -> usize {
    SpectralOptions::default().iterations
}

impl Default for RawPartitionSection {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: None,
        }
    }
}

/// Validated configuration. Only constructible through
/// `TryFrom<RawEngineConfig>` or `Default`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub partition: PartitionConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
    pub step_timeout: Option<Duration>,
    pub progress_interval: Duration,
}

impl SchedulerConfig {
    /// Options for one run; cancellation is left to the caller.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            max_parallel: self.max_parallel,
            step_timeout: self.step_timeout,
            progress_interval: self.progress_interval,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionConfig {
    pub iterations: usize,
    pub seed: u64,
}

impl PartitionConfig {
    pub fn spectral_options(&self) -> SpectralOptions {
        SpectralOptions {
            iterations: self.iterations,
            seed: self.seed,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let spectral = SpectralOptions::default();
        Self {
            scheduler: SchedulerConfig {
                max_parallel: default_max_parallel(),
                step_timeout: None,
                progress_interval: Duration::from_millis(default_progress_interval_ms()),
            },
            cache: CacheConfig {
                capacity: default_capacity(),
                ttl: Duration::from_secs(default_ttl_secs()),
            },
            partition: PartitionConfig {
                iterations: spectral.iterations,
                seed: spectral.seed,
            },
        }
    }
}
