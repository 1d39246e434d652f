//! # Configuration Structures
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Fall back to defaults for every missing field

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

/// Database URL used when nothing overrides it.
///
/// Connecting to this is almost always a mistake in tests: the container
/// environment publishes Postgres on an ephemeral port.
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/postgres";

/// Top-level configuration.
///
/// ## Usage
/// ```rust,no_run
/// use config::Config;
///
/// let config = Config::default();
/// println!("Listening on {}:{}", config.server.host, config.server.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct Config {
    /// HTTP server binding
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    /// PostgreSQL connection settings
    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Logging settings
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080
        }
    }
}

/// PostgreSQL configuration.
///
/// ## Fields
/// - `url`: `postgres://host:port/database`, credentials may be embedded
/// - `username` / `password`: override whatever the url carries
/// - `schema`: becomes the connection `search_path` when set
#[derive(Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(custom(function = "validate_database_url"))]
    pub url: String,

    pub username: String,

    pub password: String,

    pub schema: Option<String>,

    #[validate(range(min = 1, max = 1000))]
    pub max_connections: u32,

    #[validate(range(min = 1))]
    pub connect_timeout_seconds: u64
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            schema: None,
            max_connections: 10,
            connect_timeout_seconds: 30
        }
    }
}

impl DatabaseConfig {
    /// Whether the url is still the built-in default.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.url == DEFAULT_DATABASE_URL
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// One of trace/debug/info/warn/error
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    /// Emit JSON lines instead of the human-readable format
    pub json_logs: bool
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false
        }
    }
}

fn validate_database_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(())
    } else {
        Err(ValidationError::new("database_url_scheme"))
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new("log_level"))
    }
}
