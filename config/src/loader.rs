//! # Environment Variable Loader
//!
//! Loads configuration overrides from environment variables following
//! 12-factor app principles.
//!
//! ## Environment Variables
//! - `APP_HOST`, `APP_PORT`: HTTP server binding
//! - `DATABASE_URL`: `postgres://host:port/database`
//! - `DATABASE_USERNAME`, `DATABASE_PASSWORD`, `DATABASE_SCHEMA`
//! - `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT_SECONDS`
//! - `LOG_LEVEL`: trace/debug/info/warn/error
//! - `LOG_JSON`: true/false
//! - `APP_CONFIG_FILE`: path of a TOML or YAML configuration file

use crate::overlay::{self, ConfigOverlay};
use errors::ConfigError;
use std::env;
use std::path::PathBuf;

pub const CONFIG_FILE_VAR: &str = "APP_CONFIG_FILE";

const ENV_KEYS: &[(&str, &str)] = &[
    ("APP_HOST", overlay::SERVER_HOST),
    ("APP_PORT", overlay::SERVER_PORT),
    ("DATABASE_URL", overlay::DATABASE_URL),
    ("DATABASE_USERNAME", overlay::DATABASE_USERNAME),
    ("DATABASE_PASSWORD", overlay::DATABASE_PASSWORD),
    ("DATABASE_SCHEMA", overlay::DATABASE_SCHEMA),
    ("DATABASE_MAX_CONNECTIONS", overlay::DATABASE_MAX_CONNECTIONS),
    (
        "DATABASE_CONNECT_TIMEOUT_SECONDS",
        overlay::DATABASE_CONNECT_TIMEOUT_SECONDS
    ),
    ("LOG_LEVEL", overlay::OBSERVABILITY_LOG_LEVEL),
    ("LOG_JSON", overlay::OBSERVABILITY_JSON_LOGS),
];

/// Reads every recognised environment variable into an overlay.
pub fn load_from_env() -> Result<ConfigOverlay, ConfigError> {
    overlay_from_lookup(|name| env::var(name).ok())
}

/// Configuration file named by `APP_CONFIG_FILE`, if any.
#[must_use]
pub fn config_file_from_env() -> Option<PathBuf> {
    env::var_os(CONFIG_FILE_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn overlay_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ConfigOverlay, ConfigError> {
    ENV_KEYS
        .iter()
        .fold(ConfigOverlay::builder("env"), |builder, (var, key)| {
            builder.set_opt(*key, lookup(var))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_maps_variables_to_keys() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db:5432/people"),
            ("APP_PORT", "9000"),
            ("UNRELATED", "x"),
        ]
        .into_iter()
        .collect();

        let overlay = overlay_from_lookup(|name| vars.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.source(), "env");
        assert_eq!(
            overlay.get(overlay::DATABASE_URL),
            Some("postgres://db:5432/people")
        );
        assert_eq!(overlay.get(overlay::SERVER_PORT), Some("9000"));
    }

    #[test]
    #[serial]
    fn test_load_from_env_reads_process_environment() {
        // SAFETY: serialized with every other test that touches the environment.
        unsafe {
            env::set_var("DATABASE_SCHEMA", "from_env");
        }
        let overlay = load_from_env().unwrap();
        unsafe {
            env::remove_var("DATABASE_SCHEMA");
        }
        assert_eq!(overlay.get(overlay::DATABASE_SCHEMA), Some("from_env"));
    }

    #[test]
    #[serial]
    fn test_config_file_from_env() {
        unsafe {
            env::set_var(CONFIG_FILE_VAR, "/etc/person/app.toml");
        }
        let path = config_file_from_env();
        unsafe {
            env::remove_var(CONFIG_FILE_VAR);
        }
        assert_eq!(path, Some(PathBuf::from("/etc/person/app.toml")));
        assert_eq!(config_file_from_env(), None);
    }
}
