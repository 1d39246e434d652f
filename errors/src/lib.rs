//! # Person Registry Errors
//!
//! Error handling for the person registry and the containerized environment
//! its integration tests run against.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields everywhere so messages always say which service, key or
//!   resource was involved

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Test environment orchestration errors.
///
/// `Clone` so that a failed one-shot launch can be handed to every caller
/// that asks for the environment afterwards.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("Topology descriptor not found: {}", path.display())]
    MissingTopology { path: PathBuf },

    #[error("Invalid topology descriptor {}: {reason}", path.display())]
    InvalidTopology { path: PathBuf, reason: String },

    #[error("Service {service} did not start within {timeout:?}")]
    StartupTimeout { service: String, timeout: Duration },

    #[error("Service {service} failed to start: {reason}")]
    ServiceStartFailed { service: String, reason: String },

    #[error(
        "Service {service} not ready after {timeout:?}: {condition} (matched {matched} of {required})"
    )]
    ReadinessTimeout {
        service: String,
        condition: String,
        timeout: Duration,
        matched: usize,
        required: usize
    },

    #[error("No port binding for {service}:{port}: {reason}")]
    ConfigurationBindingFailure {
        service: String,
        port: u16,
        reason: String
    },

    #[error("Container runtime error: {reason}")]
    Runtime { reason: String }
}

impl EnvironmentError {
    /// Name of the service this failure is about, when there is one.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::StartupTimeout { service, .. }
            | Self::ServiceStartFailed { service, .. }
            | Self::ReadinessTimeout { service, .. }
            | Self::ConfigurationBindingFailure { service, .. } => Some(service),
            Self::MissingTopology { .. } | Self::InvalidTopology { .. } | Self::Runtime { .. } => {
                None
            }
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {reason}", path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("Failed to parse configuration file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String
    },

    #[error("Configuration validation failed: {reason}")]
    Validation { reason: String },

    #[error("A runtime configuration overlay was already applied")]
    OverlayAlreadyApplied
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionError { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    QueryError { backend: String, reason: String },

    #[error("Not found on {backend}:{id}")]
    NotFound { backend: String, id: String }
}
