//! # Configuration Overlays
//!
//! A `ConfigOverlay` is a flat set of `section.field -> value` overrides.
//! Environment variables and values computed at runtime (for instance the
//! host port a container got bound to) both arrive as overlays and go through
//! the same application routine.
//!
//! An overlay is frozen once built: there is no way to add or change a key
//! afterwards.

use crate::config::Config;
use errors::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const SERVER_HOST: &str = "server.host";
pub const SERVER_PORT: &str = "server.port";
pub const DATABASE_URL: &str = "database.url";
pub const DATABASE_USERNAME: &str = "database.username";
pub const DATABASE_PASSWORD: &str = "database.password";
pub const DATABASE_SCHEMA: &str = "database.schema";
pub const DATABASE_MAX_CONNECTIONS: &str = "database.max_connections";
pub const DATABASE_CONNECT_TIMEOUT_SECONDS: &str = "database.connect_timeout_seconds";
pub const OBSERVABILITY_LOG_LEVEL: &str = "observability.log_level";
pub const OBSERVABILITY_JSON_LOGS: &str = "observability.json_logs";

/// Every key an overlay may carry.
pub const KNOWN_KEYS: &[&str] = &[
    SERVER_HOST,
    SERVER_PORT,
    DATABASE_URL,
    DATABASE_USERNAME,
    DATABASE_PASSWORD,
    DATABASE_SCHEMA,
    DATABASE_MAX_CONNECTIONS,
    DATABASE_CONNECT_TIMEOUT_SECONDS,
    OBSERVABILITY_LOG_LEVEL,
    OBSERVABILITY_JSON_LOGS,
];

#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigOverlay {
    source: String,
    values: BTreeMap<String, String>
}

impl ConfigOverlay {
    #[must_use]
    pub fn builder(source: impl Into<String>) -> OverlayBuilder {
        OverlayBuilder {
            source: source.into(),
            values: BTreeMap::new()
        }
    }

    #[must_use]
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            values: BTreeMap::new()
        }
    }

    /// Where the values came from, used in log lines.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Writes every value onto `config` and returns a description of each
    /// change that actually altered something. Passwords are masked.
    pub fn apply_to(&self, config: &mut Config) -> Result<Vec<String>, ConfigError> {
        let mut changes = Vec::new();

        for (key, value) in &self.values {
            let changed = match key.as_str() {
                SERVER_HOST => replace(&mut config.server.host, value.clone()),
                SERVER_PORT => replace(&mut config.server.port, parse(key, value)?),
                DATABASE_URL => replace(&mut config.database.url, value.clone()),
                DATABASE_USERNAME => replace(&mut config.database.username, value.clone()),
                DATABASE_PASSWORD => replace(&mut config.database.password, value.clone()),
                DATABASE_SCHEMA => {
                    let schema = (!value.is_empty()).then(|| value.clone());
                    replace(&mut config.database.schema, schema)
                }
                DATABASE_MAX_CONNECTIONS => {
                    replace(&mut config.database.max_connections, parse(key, value)?)
                }
                DATABASE_CONNECT_TIMEOUT_SECONDS => replace(
                    &mut config.database.connect_timeout_seconds,
                    parse(key, value)?
                ),
                OBSERVABILITY_LOG_LEVEL => {
                    replace(&mut config.observability.log_level, value.clone())
                }
                OBSERVABILITY_JSON_LOGS => {
                    replace(&mut config.observability.json_logs, parse_bool(key, value)?)
                }
                _ => return Err(ConfigError::UnknownKey { key: key.clone() })
            };

            if changed {
                changes.push(describe(key, value));
            }
        }

        Ok(changes)
    }
}

impl fmt::Debug for ConfigOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: BTreeMap<&str, String> = self
            .values
            .iter()
            .map(|(k, v)| {
                let shown = if k == DATABASE_PASSWORD {
                    "***".to_string()
                } else {
                    v.clone()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("ConfigOverlay")
            .field("source", &self.source)
            .field("values", &masked)
            .finish()
    }
}

/// Collects values for a `ConfigOverlay`.
#[derive(Debug)]
pub struct OverlayBuilder {
    source: String,
    values: BTreeMap<String, String>
}

impl OverlayBuilder {
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn set_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self
        }
    }

    /// Rejects keys outside `KNOWN_KEYS`.
    pub fn build(self) -> Result<ConfigOverlay, ConfigError> {
        if let Some(key) = self.values.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownKey { key: key.clone() });
        }
        Ok(ConfigOverlay {
            source: self.source,
            values: self.values
        })
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string()
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string()
        })
    }
}

fn describe(key: &str, value: &str) -> String {
    if key == DATABASE_PASSWORD {
        format!("{key} = ***")
    } else {
        format!("{key} = {value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_unknown_key() {
        let err = ConfigOverlay::builder("test")
            .set("database.host", "db")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { key } if key == "database.host"));
    }

    #[test]
    fn test_apply_reports_only_real_changes() {
        let overlay = ConfigOverlay::builder("test")
            .set(DATABASE_URL, "postgres://localhost:49153/postgres")
            .set(DATABASE_USERNAME, "postgres")
            .set(DATABASE_PASSWORD, "postgres")
            .set(DATABASE_SCHEMA, "testcontainer")
            .build()
            .unwrap();

        let mut config = Config::default();
        let changes = overlay.apply_to(&mut config).unwrap();

        assert_eq!(config.database.url, "postgres://localhost:49153/postgres");
        assert_eq!(config.database.password, "postgres");
        assert_eq!(config.database.schema.as_deref(), Some("testcontainer"));
        // username already defaults to "postgres"
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&"database.password = ***".to_string()));
        assert!(!changes.iter().any(|c| c.contains("database.username")));
    }

    #[test]
    fn test_apply_parses_numbers_and_booleans() {
        let overlay = ConfigOverlay::builder("test")
            .set(SERVER_PORT, "3000")
            .set(OBSERVABILITY_JSON_LOGS, "yes")
            .build()
            .unwrap();
        let mut config = Config::default();
        overlay.apply_to(&mut config).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_apply_rejects_bad_number() {
        let overlay = ConfigOverlay::builder("test")
            .set(SERVER_PORT, "eighty")
            .build()
            .unwrap();
        let err = overlay.apply_to(&mut Config::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == SERVER_PORT));
    }

    #[test]
    fn test_empty_schema_clears() {
        let overlay = ConfigOverlay::builder("test")
            .set(DATABASE_SCHEMA, "")
            .build()
            .unwrap();
        let mut config = Config::default();
        config.database.schema = Some("old".to_string());
        overlay.apply_to(&mut config).unwrap();
        assert_eq!(config.database.schema, None);
    }

    #[test]
    fn test_debug_masks_password() {
        let overlay = ConfigOverlay::builder("test")
            .set(DATABASE_PASSWORD, "hunter2")
            .build()
            .unwrap();
        assert!(!format!("{overlay:?}").contains("hunter2"));
    }
}
