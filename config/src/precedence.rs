//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. Runtime overlay (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::config::Config;
use crate::file_loader::load_from_file;
use crate::loader::load_from_env;
use crate::overlay::ConfigOverlay;
use errors::ConfigError;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Assembles a validated `Config` from its layers.
///
/// ## Usage
/// ```rust,no_run
/// use config::{ConfigLoader, ConfigOverlay};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let overlay = ConfigOverlay::builder("environment")
///         .set("database.url", "postgres://localhost:49153/postgres")
///         .build()?;
///     let config = ConfigLoader::new()
///         .with_env()
///         .with_overlay(overlay)?
///         .load()?;
///     println!("{}", config.database.url);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    use_env: bool,
    overlay: Option<ConfigOverlay>
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_optional_file(mut self, path: Option<PathBuf>) -> Self {
        self.file = path;
        self
    }

    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Registers the runtime overlay. Only one may be registered.
    pub fn with_overlay(mut self, overlay: ConfigOverlay) -> Result<Self, ConfigError> {
        if self.overlay.is_some() {
            return Err(ConfigError::OverlayAlreadyApplied);
        }
        self.overlay = Some(overlay);
        Ok(self)
    }

    pub fn load(self) -> Result<Config, ConfigError> {
        let mut config = match &self.file {
            Some(path) => load_from_file(path)?,
            None => Config::default()
        };

        if self.use_env {
            merge_with_logging(&mut config, &load_from_env()?)?;
        }

        if let Some(overlay) = &self.overlay {
            merge_with_logging(&mut config, overlay)?;
        }

        config.validate().map_err(|e| ConfigError::Validation {
            reason: e.to_string()
        })?;

        Ok(config)
    }
}

fn merge_with_logging(config: &mut Config, overlay: &ConfigOverlay) -> Result<(), ConfigError> {
    let changes = overlay.apply_to(config)?;
    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", overlay.source(), changes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_only() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_second_overlay_is_rejected() {
        let loader = ConfigLoader::new()
            .with_overlay(ConfigOverlay::empty("first"))
            .unwrap();
        let err = loader
            .with_overlay(ConfigOverlay::empty("second"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OverlayAlreadyApplied));
    }

    #[test]
    #[serial]
    fn test_overlay_beats_env_beats_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[server]
port = 7000

[database]
url = "postgres://file-host:5432/postgres"
username = "file-user"
"#
        )
        .unwrap();

        unsafe {
            std::env::set_var("DATABASE_USERNAME", "env-user");
            std::env::set_var("DATABASE_URL", "postgres://env-host:5432/postgres");
        }

        let runtime = ConfigOverlay::builder("environment")
            .set(overlay::DATABASE_URL, "postgres://localhost:49153/postgres")
            .build()
            .unwrap();

        let result = ConfigLoader::new()
            .with_file(file.path())
            .with_env()
            .with_overlay(runtime)
            .unwrap()
            .load();

        unsafe {
            std::env::remove_var("DATABASE_USERNAME");
            std::env::remove_var("DATABASE_URL");
        }

        let config = result.unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.database.username, "env-user");
        assert_eq!(config.database.url, "postgres://localhost:49153/postgres");
        assert!(!config.database.is_placeholder());
    }

    #[test]
    fn test_invalid_result_fails_validation() {
        let runtime = ConfigOverlay::builder("environment")
            .set(overlay::DATABASE_URL, "http://not-postgres")
            .build()
            .unwrap();
        let err = ConfigLoader::new()
            .with_overlay(runtime)
            .unwrap()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
