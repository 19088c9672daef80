//! Configuration management
//!
//! Handles config.toml (user-defined) and config.lock (generated with all
//! defaults filled in). The lock file is what the run mode consumes; a
//! configuration that fails validation is rejected and never applied.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

/// Load a generated lock file
pub fn load_lock<P: AsRef<Path>>(path: P) -> Result<ConfigLock> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let lock: ConfigLock = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(lock)
}

/// Generate a lock file from config, filling in all defaults
///
/// `source` is the raw config.toml content; its hash is recorded so a
/// stale lock can be detected.
pub fn generate_lock(config: &Config, source: &str) -> ConfigLock {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    ConfigLock::from_config(config, hash)
}
