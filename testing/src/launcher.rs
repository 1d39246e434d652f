//! Environment launcher.
//!
//! Starts the services of a topology in dependency order, arms their
//! readiness signals, and returns once every signal is satisfied and every
//! exposed port is resolved.

use errors::EnvironmentError;
use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::AbortHandle;

use crate::compose::ComposeRuntime;
use crate::readiness::{ProbeContext, ReadinessStrategy};
use crate::runtime::{ContainerRuntime, HostBinding};
use crate::teardown;
use crate::topology::Topology;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// What to do when the topology descriptor does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingTopologyPolicy {
    /// Fail with `MissingTopology`.
    #[default]
    FailFast,
    /// Return `Environment::Disabled` and start nothing.
    Disabled
}

/// Outcome of a launch.
#[derive(Debug, Clone)]
pub enum Environment {
    Running(RunningEnvironment),
    /// No descriptor was found and the launcher was told to carry on.
    Disabled { descriptor: PathBuf }
}

impl Environment {
    #[must_use]
    pub fn running(&self) -> Option<&RunningEnvironment> {
        match self {
            Self::Running(env) => Some(env),
            Self::Disabled { .. } => None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedBinding {
    pub service: String,
    pub container_port: u16,
    pub binding: HostBinding
}

/// A started environment with every exposed port resolved.
#[derive(Debug, Clone)]
pub struct RunningEnvironment {
    project: String,
    bindings: Vec<ExposedBinding>
}

impl RunningEnvironment {
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn bindings(&self) -> &[ExposedBinding] {
        &self.bindings
    }

    pub fn binding(&self, service: &str, port: u16) -> Result<&HostBinding, EnvironmentError> {
        self.bindings
            .iter()
            .find(|b| b.service == service && b.container_port == port)
            .map(|b| &b.binding)
            .ok_or_else(|| EnvironmentError::ConfigurationBindingFailure {
                service: service.to_string(),
                port,
                reason: "port was not declared as exposed".to_string()
            })
    }

    pub fn service_host(&self, service: &str, port: u16) -> Result<&str, EnvironmentError> {
        self.binding(service, port).map(|b| b.host.as_str())
    }

    pub fn service_port(&self, service: &str, port: u16) -> Result<u16, EnvironmentError> {
        self.binding(service, port).map(|b| b.port)
    }
}

type SignalFuture = Shared<BoxFuture<'static, Result<(), EnvironmentError>>>;

struct ArmedSignal {
    service: String,
    abort: AbortHandle,
    done: SignalFuture
}

/// Starts a topology at most once.
///
/// ## Usage
/// ```rust,no_run
/// use testing::{EnvironmentLauncher, LogPatternStrategy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), errors::EnvironmentError> {
/// let launcher = EnvironmentLauncher::new("testing/compose.yml")
///     .with_exposed_service("db", 5432)
///     .waiting_for(
///         "migration",
///         LogPatternStrategy::new("migration done")?
///             .with_timeout(Duration::from_secs(120))
///     );
/// let environment = launcher.launch().await?;
/// assert!(environment.running().is_some());
/// # Ok(())
/// # }
/// ```
pub struct EnvironmentLauncher {
    descriptor: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    exposed: Vec<(String, u16)>,
    waits: Vec<(String, Arc<dyn ReadinessStrategy>)>,
    startup_timeout: Duration,
    missing_topology: MissingTopologyPolicy,
    exit_hook: bool,
    launched: OnceCell<Result<Environment, EnvironmentError>>
}

impl EnvironmentLauncher {
    /// Drives `docker compose` under a fresh project name.
    pub fn new(descriptor: impl AsRef<Path>) -> Self {
        let runtime = Arc::new(ComposeRuntime::new(descriptor.as_ref()));
        Self::with_runtime(descriptor, runtime)
    }

    pub fn with_runtime(descriptor: impl AsRef<Path>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            descriptor: descriptor.as_ref().to_path_buf(),
            runtime,
            exposed: Vec::new(),
            waits: Vec::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            missing_topology: MissingTopologyPolicy::default(),
            exit_hook: true,
            launched: OnceCell::new()
        }
    }

    #[must_use]
    pub fn with_exposed_service(mut self, service: impl Into<String>, port: u16) -> Self {
        self.exposed.push((service.into(), port));
        self
    }

    #[must_use]
    pub fn waiting_for(
        mut self,
        service: impl Into<String>,
        strategy: impl ReadinessStrategy + 'static
    ) -> Self {
        self.waits.push((service.into(), Arc::new(strategy)));
        self
    }

    /// Bound on each individual service start.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn on_missing_topology(mut self, policy: MissingTopologyPolicy) -> Self {
        self.missing_topology = policy;
        self
    }

    /// Whether to tear the environment down when the process exits.
    #[must_use]
    pub fn with_exit_hook(mut self, enabled: bool) -> Self {
        self.exit_hook = enabled;
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Starts the environment on first call; later calls return the first
    /// outcome without touching the runtime again.
    pub async fn launch(&self) -> Result<&Environment, EnvironmentError> {
        self.launched
            .get_or_init(|| self.start())
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    async fn start(&self) -> Result<Environment, EnvironmentError> {
        let topology = match Topology::load(&self.descriptor) {
            Ok(topology) => topology,
            Err(EnvironmentError::MissingTopology { path })
                if self.missing_topology == MissingTopologyPolicy::Disabled =>
            {
                tracing::warn!(
                    descriptor = %path.display(),
                    "Topology descriptor not found, test environment disabled"
                );
                return Ok(Environment::Disabled { descriptor: path });
            }
            Err(e) => return Err(e)
        };

        self.check_declarations(&topology)?;
        self.runtime.prepare(&topology).await?;

        if self.exit_hook {
            teardown::register(Arc::clone(&self.runtime));
        }

        let project = self.runtime.project().to_string();
        tracing::info!(
            project = %project,
            services = topology.services().len(),
            signals = self.waits.len(),
            "Starting test environment"
        );

        let mut armed = Vec::new();
        if let Err(e) = self.start_services(&topology, &mut armed).await {
            for signal in &armed {
                signal.abort.abort();
            }
            tracing::error!(project = %project, error = %e, "Test environment failed to start");
            return Err(e);
        }

        let outcomes = join_all(armed.iter().map(|s| s.done.clone())).await;
        let mut failures = outcomes.into_iter().filter_map(Result::err);
        if let Some(first) = failures.next() {
            for other in failures {
                tracing::error!(project = %project, error = %other, "Additional readiness failure");
            }
            tracing::error!(project = %project, error = %first, "Test environment not ready");
            return Err(first);
        }

        let bindings = self.resolve_bindings().await?;
        tracing::info!(project = %project, "Test environment ready");

        Ok(Environment::Running(RunningEnvironment { project, bindings }))
    }

    fn check_declarations(&self, topology: &Topology) -> Result<(), EnvironmentError> {
        let invalid = |reason: String| EnvironmentError::InvalidTopology {
            path: topology.path().to_path_buf(),
            reason
        };

        for (service, port) in &self.exposed {
            if topology.service(service).is_some_and(|spec| !spec.publishes(*port)) {
                return Err(invalid(format!("service {service} does not publish port {port}")));
            }
        }

        let services = self
            .exposed
            .iter()
            .map(|(service, _)| service)
            .chain(self.waits.iter().map(|(service, _)| service));

        for service in services {
            if topology.service(service).is_none() {
                return Err(invalid(format!("service {service} is not declared")));
            }
        }
        Ok(())
    }

    async fn start_services(
        &self,
        topology: &Topology,
        armed: &mut Vec<ArmedSignal>
    ) -> Result<(), EnvironmentError> {
        for service in topology.start_order() {
            for dependency in service
                .depends_on
                .iter()
                .filter(|d| d.condition.awaits_signals())
            {
                let gates: Vec<SignalFuture> = armed
                    .iter()
                    .filter(|s| s.service == dependency.service)
                    .map(|s| s.done.clone())
                    .collect();
                if gates.is_empty() {
                    tracing::warn!(
                        service = %service.name,
                        dependency = %dependency.service,
                        "Gating dependency has no readiness signal, treating started as ready"
                    );
                }
                for gate in gates {
                    gate.await?;
                }
            }

            tracing::info!(service = %service.name, "Starting service");
            tokio::time::timeout(self.startup_timeout, self.runtime.start_service(&service.name))
                .await
                .map_err(|_| EnvironmentError::StartupTimeout {
                    service: service.name.clone(),
                    timeout: self.startup_timeout
                })??;

            for (name, strategy) in self.waits.iter().filter(|(name, _)| *name == service.name) {
                tracing::debug!(service = %name, condition = %strategy.describe(), "Arming readiness signal");
                armed.push(self.arm(name, Arc::clone(strategy)));
            }
        }
        Ok(())
    }

    fn arm(&self, service: &str, strategy: Arc<dyn ReadinessStrategy>) -> ArmedSignal {
        let ctx = ProbeContext {
            service: service.to_string(),
            runtime: Arc::clone(&self.runtime)
        };
        let handle = tokio::spawn(async move { strategy.wait(ctx).await });
        let abort = handle.abort_handle();

        let name = service.to_string();
        let done = async move {
            handle.await.unwrap_or_else(|e| {
                Err(EnvironmentError::Runtime {
                    reason: format!("readiness check of {name} did not complete: {e}")
                })
            })
        }
        .boxed()
        .shared();

        ArmedSignal {
            service: service.to_string(),
            abort,
            done
        }
    }

    async fn resolve_bindings(&self) -> Result<Vec<ExposedBinding>, EnvironmentError> {
        let mut bindings = Vec::with_capacity(self.exposed.len());
        for (service, port) in &self.exposed {
            let failure = |reason: String| EnvironmentError::ConfigurationBindingFailure {
                service: service.clone(),
                port: *port,
                reason
            };
            let binding = self
                .runtime
                .port(service, *port)
                .await
                .map_err(|e| failure(e.to_string()))?
                .ok_or_else(|| failure("port is not bound on the host".to_string()))?;

            tracing::info!(service = %service, port, %binding, "Resolved port binding");
            bindings.push(ExposedBinding {
                service: service.clone(),
                container_port: *port,
                binding
            });
        }
        Ok(bindings)
    }
}
