//! Container runtime seam used by the launcher.

use async_trait::async_trait;
use errors::EnvironmentError;
use futures_util::stream::BoxStream;
use std::fmt;

use crate::topology::Topology;

/// Externally reachable address of a published container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host: String,
    pub port: u16
}

impl fmt::Display for HostBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Starts services of one environment and reports on them.
///
/// Implementations own exactly one isolated environment (one compose
/// project, one network).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Identifier of the environment, used in logs.
    fn project(&self) -> &str;

    /// Checks the descriptor with the runtime before anything is started.
    async fn prepare(&self, topology: &Topology) -> Result<(), EnvironmentError>;

    /// Starts a single service without touching its dependencies.
    async fn start_service(&self, service: &str) -> Result<(), EnvironmentError>;

    /// Follows the service's output. The stream replays from container start,
    /// so attaching after `start_service` returns sees every line.
    async fn logs(&self, service: &str) -> Result<BoxStream<'static, String>, EnvironmentError>;

    /// Resolves the host binding of `port`, `None` when it is not published.
    async fn port(&self, service: &str, port: u16)
    -> Result<Option<HostBinding>, EnvironmentError>;

    /// Stops and removes everything. Blocking so it can run from exit hooks;
    /// calling it again is a no-op.
    fn teardown(&self) -> Result<(), EnvironmentError>;
}
