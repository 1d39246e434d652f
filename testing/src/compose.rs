//! `docker compose` CLI driver.

use async_trait::async_trait;
use errors::EnvironmentError;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use crate::runtime::{ContainerRuntime, HostBinding};
use crate::topology::Topology;

/// Runs one compose project per instance, named uniquely so that parallel
/// test processes get separate networks and containers.
pub struct ComposeRuntime {
    program: String,
    descriptor: PathBuf,
    project: String,
    torn_down: AtomicBool
}

impl ComposeRuntime {
    pub fn new(descriptor: impl AsRef<Path>) -> Self {
        let project = format!("itest-{}", Uuid::new_v4().simple());
        Self::with_project(descriptor, project)
    }

    pub fn with_project(descriptor: impl AsRef<Path>, project: impl Into<String>) -> Self {
        Self {
            program: "docker".to_string(),
            descriptor: descriptor.as_ref().to_path_buf(),
            project: project.into(),
            torn_down: AtomicBool::new(false)
        }
    }

    fn args<'a>(&self, rest: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "compose".into(),
            "-f".into(),
            self.descriptor.clone().into_os_string(),
            "-p".into(),
            self.project.clone().into(),
        ];
        args.extend(rest.into_iter().map(OsString::from));
        args
    }

    fn command<'a>(&self, rest: impl IntoIterator<Item = &'a str>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args(rest)).stdin(Stdio::null());
        command
    }

    /// Runs to completion; `Ok(stdout)` on success, `Err(stderr)` otherwise.
    async fn run<'a>(
        &self,
        rest: impl IntoIterator<Item = &'a str>
    ) -> Result<Result<String, String>, EnvironmentError> {
        let output = self
            .command(rest)
            .output()
            .await
            .map_err(|e| EnvironmentError::Runtime {
                reason: format!("cannot run {} compose: {e}", self.program)
            })?;

        if output.status.success() {
            Ok(Ok(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

fn lines<R>(reader: R) -> BoxStream<'static, String>
where
    R: AsyncRead + Unpin + Send + 'static
{
    stream::unfold(BufReader::new(reader).lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            _ => None
        }
    })
    .boxed()
}

/// Host to reach published ports on: the `DOCKER_HOST` machine for remote
/// daemons, `localhost` otherwise.
fn docker_host() -> String {
    std::env::var("DOCKER_HOST")
        .ok()
        .and_then(|url| {
            let rest = url.strip_prefix("tcp://")?;
            let host = rest.rsplit_once(':').map_or(rest, |(host, _)| host);
            (!host.is_empty()).then(|| host.to_string())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Parses `docker compose port` output such as `0.0.0.0:49153` or `[::]:49153`.
fn parse_port_output(output: &str) -> Option<HostBinding> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (host, port) = line.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }
    let host = match host {
        "" | "0.0.0.0" | "::" | "[::]" => docker_host(),
        other => other.trim_start_matches('[').trim_end_matches(']').to_string()
    };
    Some(HostBinding { host, port })
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    fn project(&self) -> &str {
        &self.project
    }

    async fn prepare(&self, topology: &Topology) -> Result<(), EnvironmentError> {
        tracing::debug!(project = %self.project, descriptor = %self.descriptor.display(), "Validating compose descriptor");
        self.run(["config", "--quiet"])
            .await?
            .map(|_| ())
            .map_err(|reason| EnvironmentError::InvalidTopology {
                path: topology.path().to_path_buf(),
                reason
            })
    }

    async fn start_service(&self, service: &str) -> Result<(), EnvironmentError> {
        self.run(["up", "-d", "--no-deps", service])
            .await?
            .map(|_| ())
            .map_err(|reason| EnvironmentError::ServiceStartFailed {
                service: service.to_string(),
                reason
            })
    }

    async fn logs(&self, service: &str) -> Result<BoxStream<'static, String>, EnvironmentError> {
        let mut child = self
            .command(["logs", "--follow", "--no-color", "--no-log-prefix", service])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvironmentError::Runtime {
                reason: format!("cannot follow logs of {service}: {e}")
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(EnvironmentError::Runtime {
                reason: format!("log pipes of {service} unavailable")
            });
        };

        // The child travels with the stream so dropping the stream kills it.
        let merged = stream::select(lines(stdout), lines(stderr));
        let stream = stream::unfold((merged, child), |(mut merged, child)| async move {
            merged.next().await.map(|line| (line, (merged, child)))
        });
        Ok(stream.boxed())
    }

    async fn port(
        &self,
        service: &str,
        port: u16
    ) -> Result<Option<HostBinding>, EnvironmentError> {
        let port = port.to_string();
        match self.run(["port", service, port.as_str()]).await? {
            Ok(output) => Ok(parse_port_output(&output)),
            Err(reason) => {
                tracing::debug!(service, port = %port, reason = %reason, "Port lookup failed");
                Ok(None)
            }
        }
    }

    fn teardown(&self) -> Result<(), EnvironmentError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(project = %self.project, "Tearing down test environment");
        let output = std::process::Command::new(&self.program)
            .args(self.args(["down", "-v", "--remove-orphans", "--rmi", "local"]))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EnvironmentError::Runtime {
                reason: format!("cannot run {} compose down: {e}", self.program)
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EnvironmentError::Runtime {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string()
            })
        }
    }
}
