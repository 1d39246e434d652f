//! Process-wide test session.
//!
//! Owns the environment for `testing/compose.yml` and the overlay derived
//! from it. Everything it hands out is plain data, so tests running on
//! different tokio runtimes share one environment.

use config::{Config, ConfigLoader, ConfigOverlay};
use errors::EnvironmentError;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::bridge::{ConfigurationBridge, DatasourceBinding};
use crate::launcher::{Environment, EnvironmentLauncher};
use crate::readiness::LogPatternStrategy;

pub const DESCRIPTOR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/compose.yml");

pub const DB_SERVICE_NAME: &str = "db-service-test";
pub const DB_PORT: u16 = 5432;
pub const DB_READY_MARKER: &str = "database system is ready to accept connections";
/// The image logs the marker once for its init server and once for the real one.
pub const DB_READY_TIMES: usize = 2;

pub const MIGRATION_SERVICE_NAME: &str = "migration-test";
pub const MIGRATION_MARKER: &str = "migration update executed successfully";
pub const MIGRATION_TIMEOUT: Duration = Duration::from_secs(120);

pub const DATABASE_SCHEMA: &str = "testcontainer";

static GLOBAL: OnceLock<Result<TestSession, EnvironmentError>> = OnceLock::new();

pub struct TestSession {
    launcher: EnvironmentLauncher,
    bridge: ConfigurationBridge,
    overlay: OnceCell<Result<ConfigOverlay, EnvironmentError>>
}

impl TestSession {
    pub fn new(launcher: EnvironmentLauncher, bridge: ConfigurationBridge) -> Self {
        Self {
            launcher,
            bridge,
            overlay: OnceCell::new()
        }
    }

    /// The session shared by every test of the process.
    pub fn global() -> Result<&'static Self, EnvironmentError> {
        GLOBAL
            .get_or_init(Self::from_descriptor)
            .as_ref()
            .map_err(Clone::clone)
    }

    fn from_descriptor() -> Result<Self, EnvironmentError> {
        let launcher = EnvironmentLauncher::new(DESCRIPTOR)
            .with_exposed_service(DB_SERVICE_NAME, DB_PORT)
            .waiting_for(
                DB_SERVICE_NAME,
                LogPatternStrategy::new(DB_READY_MARKER)?
                    .times(DB_READY_TIMES)
                    .with_timeout(MIGRATION_TIMEOUT)
            )
            .waiting_for(
                MIGRATION_SERVICE_NAME,
                LogPatternStrategy::new(MIGRATION_MARKER)?
                    .times(1)
                    .with_timeout(MIGRATION_TIMEOUT)
            );

        let bridge = ConfigurationBridge::new(
            DatasourceBinding::postgres(DB_SERVICE_NAME, DB_PORT).with_schema(DATABASE_SCHEMA)
        );

        Ok(Self::new(launcher, bridge))
    }

    pub async fn environment(&self) -> Result<&Environment, EnvironmentError> {
        self.launcher.launch().await
    }

    /// Launches on first use and derives the overlay exactly once.
    pub async fn overlay(&self) -> Result<ConfigOverlay, EnvironmentError> {
        self.overlay
            .get_or_init(|| async {
                let environment = self.launcher.launch().await?;
                self.bridge.overlay(environment)
            })
            .await
            .clone()
    }

    /// Application configuration with the environment overlay applied last.
    pub async fn app_config(&self) -> anyhow::Result<Config> {
        let overlay = self.overlay().await?;
        let config = ConfigLoader::new()
            .with_env()
            .with_overlay(overlay)?
            .load()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ContainerRuntime;
    use crate::scripted::ScriptedRuntime;
    use std::sync::Arc;

    fn scripted_session(runtime: &Arc<ScriptedRuntime>) -> TestSession {
        let dyn_runtime: Arc<dyn ContainerRuntime> = runtime.clone();
        let launcher = EnvironmentLauncher::with_runtime(DESCRIPTOR, dyn_runtime)
            .with_exit_hook(false)
            .with_exposed_service(DB_SERVICE_NAME, DB_PORT)
            .waiting_for(
                MIGRATION_SERVICE_NAME,
                LogPatternStrategy::new(MIGRATION_MARKER)
                    .unwrap()
                    .with_timeout(MIGRATION_TIMEOUT)
            );
        let bridge = ConfigurationBridge::new(
            DatasourceBinding::postgres(DB_SERVICE_NAME, DB_PORT).with_schema(DATABASE_SCHEMA)
        );
        TestSession::new(launcher, bridge)
    }

    fn ready_runtime() -> Arc<ScriptedRuntime> {
        Arc::new(
            ScriptedRuntime::new()
                .log(MIGRATION_SERVICE_NAME, Duration::from_secs(3), MIGRATION_MARKER)
                .publish(DB_SERVICE_NAME, DB_PORT, 49160)
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_config_uses_bound_port_not_placeholder() {
        let runtime = ready_runtime();
        let session = scripted_session(&runtime);

        let config = session.app_config().await.unwrap();
        assert!(!config.database.is_placeholder());
        assert_eq!(config.database.url, "postgres://localhost:49160/postgres");
        assert_eq!(config.database.schema.as_deref(), Some(DATABASE_SCHEMA));

        let environment = session.environment().await.unwrap();
        let running = environment.running().unwrap();
        assert_eq!(
            running.service_port(DB_SERVICE_NAME, DB_PORT).unwrap(),
            49160
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_is_computed_once() {
        let runtime = ready_runtime();
        let session = scripted_session(&runtime);

        let first = session.overlay().await.unwrap();
        let second = session.overlay().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.count("prepare"), 1);
        assert_eq!(runtime.count(&format!("port {DB_SERVICE_NAME}:{DB_PORT}")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_surfaces_through_app_config() {
        let runtime = Arc::new(ScriptedRuntime::new().publish(DB_SERVICE_NAME, DB_PORT, 49160));
        let session = scripted_session(&runtime);

        let err = session.app_config().await.unwrap_err();
        let err = err.downcast::<EnvironmentError>().unwrap();
        assert_eq!(err.service(), Some(MIGRATION_SERVICE_NAME));
    }
}
