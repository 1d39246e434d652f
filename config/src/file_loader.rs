//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files, picking the format from the
//! file extension.

use crate::config::Config;
use errors::ConfigError;
use std::path::Path;

/// Load configuration from file with auto-detection.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml` / `.yml`: YAML format
///
/// Missing sections and fields take their default values.
pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        reason: e.to_string()
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let parsed = match extension.as_deref() {
        Some("toml") => toml::from_str(&contents).map_err(|e| e.to_string()),
        Some("yaml" | "yml") => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        Some(other) => Err(format!("unsupported format: {other}")),
        None => Err("file has no extension".to_string())
    };

    parsed.map_err(|reason| ConfigError::Parse {
        path: path.to_path_buf(),
        reason
    })
}
