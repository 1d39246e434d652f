//! # Configuration System
//!
//! Centralized configuration management for the person registry.
//!
//! This crate provides:
//! - Configuration structures for the HTTP server, database and logging
//! - Configuration file loading (TOML/YAML)
//! - Environment variable loading (12-factor app principles)
//! - Runtime overlays computed after startup (e.g. ephemeral database ports)
//! - Configuration precedence (overlay > env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod overlay;
pub mod precedence;

pub use config::{Config, DEFAULT_DATABASE_URL, DatabaseConfig, ObservabilityConfig, ServerConfig};
pub use file_loader::load_from_file;
pub use loader::{config_file_from_env, load_from_env};
pub use overlay::{ConfigOverlay, OverlayBuilder};
pub use precedence::ConfigLoader;
pub use validator::Validate;
