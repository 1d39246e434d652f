//! Containerized test environment for the person registry.
//!
//! - `EnvironmentLauncher` starts a compose topology at most once, in
//!   dependency order, and waits for every readiness signal
//! - `ReadinessStrategy` implementations: log pattern, TCP probe, HTTP health
//! - `ConfigurationBridge` turns resolved port bindings into a `ConfigOverlay`
//! - `TestSession::global()` wires all of it for `testing/compose.yml`
//! - `postgres()` is a lighter single-container fixture for repository tests

mod bridge;
mod compose;
mod fixtures;
mod launcher;
mod readiness;
mod runtime;
#[cfg(test)]
mod scripted;
mod session;
pub mod teardown;
pub mod topology;

pub use bridge::{ConfigurationBridge, DatasourceBinding, OVERLAY_SOURCE};
pub use compose::ComposeRuntime;
pub use fixtures::*;
pub use launcher::{
    DEFAULT_STARTUP_TIMEOUT, Environment, EnvironmentLauncher, ExposedBinding,
    MissingTopologyPolicy, RunningEnvironment
};
pub use readiness::{
    HttpHealthStrategy, LogPatternStrategy, ProbeContext, ReadinessStrategy, TcpProbeStrategy,
    await_log_pattern
};
pub use runtime::{ContainerRuntime, HostBinding};
pub use session::{
    DATABASE_SCHEMA, DB_PORT, DB_READY_MARKER, DB_SERVICE_NAME, DESCRIPTOR, MIGRATION_MARKER,
    MIGRATION_SERVICE_NAME, MIGRATION_TIMEOUT, TestSession
};
pub use topology::Topology;
