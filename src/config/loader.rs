// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw `RawEngineConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawEngineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = EngineConfig::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
///
/// Any other IO error, and any parse or validation error, is returned.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(EngineConfig::default());
    }
    load_and_validate(path)
}

/// `Beadflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Beadflow.toml")
}
