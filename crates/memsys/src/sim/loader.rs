//! Configuration Loading.
//!
//! This module reads topology documents. It performs:
//! 1. **File loading:** Reads a JSON topology from disk.
//! 2. **Parsing:** Deserializes a JSON string into a [`SystemConfig`], applying defaults.
//!
//! Validation happens later, in [`crate::sim::builder`].

use std::fs;
use std::path::Path;

use crate::common::ConfigError;
use crate::config::SystemConfig;

/// Parses a JSON topology.
///
/// # Arguments
///
/// * `text` - The JSON document.
///
/// # Returns
///
/// The configuration with defaults filled in, or `ConfigError::Json`.
pub fn parse_config(text: &str) -> Result<SystemConfig, ConfigError> {
    Ok(serde_json::from_str(text)?)
}

/// Reads and parses a JSON topology file.
///
/// # Arguments
///
/// * `path` - Path to the configuration file.
///
/// # Returns
///
/// The configuration, or `ConfigError::Io` / `ConfigError::Json`.
pub fn load_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}
