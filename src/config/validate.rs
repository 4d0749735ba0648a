// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    CacheConfig, EngineConfig, PartitionConfig, RawEngineConfig, SchedulerConfig,
};
use crate::errors::{BeadflowError, Result};
use crate::partition::SpectralOptions;

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = BeadflowError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        Ok(EngineConfig {
            scheduler: SchedulerConfig {
                max_parallel: raw.scheduler.max_parallel,
                step_timeout: raw.scheduler.step_timeout_ms.map(Duration::from_millis),
                progress_interval: Duration::from_millis(raw.scheduler.progress_interval_ms),
            },
            cache: CacheConfig {
                capacity: raw.cache.capacity,
                ttl: Duration::from_secs(raw.cache.ttl_secs),
            },
            partition: PartitionConfig {
                iterations: raw.partition.iterations,
                seed: raw
                    .partition
                    .seed
                    .unwrap_or_else(|| SpectralOptions::default().seed),
            },
        })
    }
}

fn validate_raw_config(cfg: &RawEngineConfig) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_cache(cfg)?;
    validate_partition(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RawEngineConfig) -> Result<()> {
    let s = &cfg.scheduler;
    if s.max_parallel == 0 {
        return Err(BeadflowError::Config(
            "[scheduler].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.progress_interval_ms == 0 {
        return Err(BeadflowError::Config(
            "[scheduler].progress_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if s.step_timeout_ms == Some(0) {
        return Err(BeadflowError::Config(
            "[scheduler].step_timeout_ms must be >= 1 when set (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_cache(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.cache.capacity == 0 {
        return Err(BeadflowError::Config(
            "[cache].capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_partition(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.partition.iterations == 0 {
        return Err(BeadflowError::Config(
            "[partition].iterations must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
