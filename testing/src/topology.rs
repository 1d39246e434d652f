//! Compose-format topology descriptor.
//!
//! Only the keys the launcher needs are interpreted (`image`, `build`,
//! `ports`, `depends_on`); everything else is left to the compose tool.

use errors::EnvironmentError;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// When a dependent service may be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyCondition {
    /// The dependency has been started.
    Started,
    /// Every readiness signal of the dependency is satisfied.
    Healthy,
    /// The dependency ran to completion. Gated on its readiness signals,
    /// like `Healthy`.
    CompletedSuccessfully
}

impl DependencyCondition {
    /// Whether the dependent must wait for the dependency's readiness signals.
    #[must_use]
    pub fn awaits_signals(self) -> bool {
        matches!(self, Self::Healthy | Self::CompletedSuccessfully)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub service: String,
    pub condition: DependencyCondition
}

/// One entry of a service's `ports` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub host_ip: Option<String>,
    /// `None` means the runtime picks an ephemeral host port.
    pub host_port: Option<u16>,
    pub container_port: u16
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: Option<String>,
    pub build: Option<String>,
    pub ports: Vec<PortSpec>,
    /// Entries the launcher does not interpret, such as port ranges. They
    /// never count as published ports.
    pub opaque_ports: Vec<String>,
    pub depends_on: Vec<Dependency>
}

impl ServiceSpec {
    #[must_use]
    pub fn publishes(&self, container_port: u16) -> bool {
        self.ports.iter().any(|p| p.container_port == container_port)
    }
}

/// A validated service topology.
#[derive(Debug, Clone)]
pub struct Topology {
    path: PathBuf,
    services: Vec<ServiceSpec>,
    start_order: Vec<usize>
}

impl Topology {
    /// Reads and validates the descriptor at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnvironmentError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EnvironmentError::MissingTopology {
                    path: path.to_path_buf()
                });
            }
            Err(e) => {
                return Err(invalid(path, format!("cannot read descriptor: {e}")));
            }
        };
        Self::parse(path, &contents)
    }

    /// Parses descriptor text; `path` is only used in error messages.
    pub fn parse(path: impl AsRef<Path>, contents: &str) -> Result<Self, EnvironmentError> {
        let path = path.as_ref();
        let document: Value =
            serde_yaml::from_str(contents).map_err(|e| invalid(path, e.to_string()))?;

        let services = document
            .get("services")
            .and_then(Value::as_mapping)
            .ok_or_else(|| invalid(path, "missing `services` mapping"))?;

        let mut specs = Vec::with_capacity(services.len());
        for (name, body) in services {
            let name = name
                .as_str()
                .ok_or_else(|| invalid(path, "service names must be strings"))?;
            specs.push(parse_service(path, name, body)?);
        }

        if specs.is_empty() {
            return Err(invalid(path, "no services declared"));
        }

        let start_order = start_order(path, &specs)?;
        Ok(Self {
            path: path.to_path_buf(),
            services: specs,
            start_order
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Services in declaration order.
    #[must_use]
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Dependencies first; declaration order breaks ties.
    pub fn start_order(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.start_order.iter().map(|&i| &self.services[i])
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> EnvironmentError {
    EnvironmentError::InvalidTopology {
        path: path.to_path_buf(),
        reason: reason.into()
    }
}

fn parse_service(path: &Path, name: &str, body: &Value) -> Result<ServiceSpec, EnvironmentError> {
    let empty = Mapping::new();
    let body = match body {
        Value::Mapping(m) => m,
        Value::Null => &empty,
        _ => return Err(invalid(path, format!("service {name} must be a mapping")))
    };

    let image = body.get("image").and_then(Value::as_str).map(str::to_string);
    let build = match body.get("build") {
        None => None,
        Some(Value::String(context)) => Some(context.clone()),
        Some(Value::Mapping(m)) => Some(
            m.get("context")
                .and_then(Value::as_str)
                .unwrap_or(".")
                .to_string()
        ),
        Some(_) => return Err(invalid(path, format!("service {name}: malformed `build`")))
    };
    if image.is_none() && build.is_none() {
        return Err(invalid(
            path,
            format!("service {name} needs an `image` or a `build`")
        ));
    }

    let mut ports = Vec::new();
    let mut opaque_ports = Vec::new();
    match body.get("ports") {
        None => {}
        Some(Value::Sequence(entries)) => {
            for entry in entries {
                match parse_port(entry) {
                    Some(port) => ports.push(port),
                    None => {
                        let raw = entry
                            .as_str()
                            .map_or_else(|| format!("{entry:?}"), str::to_string);
                        tracing::debug!(service = %name, port = %raw, "Leaving port entry to compose");
                        opaque_ports.push(raw);
                    }
                }
            }
        }
        Some(_) => return Err(invalid(path, format!("service {name}: `ports` must be a list")))
    }

    let depends_on = parse_depends_on(path, name, body.get("depends_on"))?;

    Ok(ServiceSpec {
        name: name.to_string(),
        image,
        build,
        ports,
        opaque_ports,
        depends_on
    })
}

/// Short syntax (`5432`, `"15432:5432"`, `"127.0.0.1::5432/tcp"`) or the
/// long `{target, published, host_ip}` mapping. `None` for anything else.
fn parse_port(entry: &Value) -> Option<PortSpec> {
    match entry {
        Value::Number(n) => Some(PortSpec {
            host_ip: None,
            host_port: None,
            container_port: u16::try_from(n.as_u64()?).ok()?
        }),
        Value::String(s) => parse_port_str(s),
        Value::Mapping(m) => {
            let container_port = u16::try_from(m.get("target")?.as_u64()?).ok()?;
            let host_port = match m.get("published") {
                None => None,
                Some(Value::Number(n)) => Some(u16::try_from(n.as_u64()?).ok()?),
                Some(Value::String(s)) => Some(s.parse().ok()?),
                Some(_) => return None
            };
            Some(PortSpec {
                host_ip: m.get("host_ip").and_then(Value::as_str).map(str::to_string),
                host_port,
                container_port
            })
        }
        _ => None
    }
}

fn parse_port_str(raw: &str) -> Option<PortSpec> {
    let raw = raw
        .strip_suffix("/tcp")
        .or_else(|| raw.strip_suffix("/udp"))
        .unwrap_or(raw);

    let (host_ip, host_port, container) = match raw.rsplitn(3, ':').collect::<Vec<_>>()[..] {
        [container] => (None, None, container),
        [container, host] => (None, Some(host), container),
        [container, host, ip] => (Some(ip), Some(host), container),
        _ => return None
    };

    // Interpolated host sides are resolved by compose; the runtime reports
    // the actual binding.
    if host_port.is_some_and(|h| h.contains('$')) || host_ip.is_some_and(|ip| ip.contains('$')) {
        return Some(PortSpec {
            host_ip: None,
            host_port: None,
            container_port: container.parse().ok()?
        });
    }

    let host_port = match host_port {
        Some("") | None => None,
        Some(port) => Some(port.parse().ok()?)
    };

    Some(PortSpec {
        host_ip: host_ip.filter(|ip| !ip.is_empty()).map(str::to_string),
        host_port,
        container_port: container.parse().ok()?
    })
}

fn parse_depends_on(
    path: &Path,
    name: &str,
    value: Option<&Value>
) -> Result<Vec<Dependency>, EnvironmentError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Sequence(entries)) => entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(|service| Dependency {
                        service: service.to_string(),
                        condition: DependencyCondition::Started
                    })
                    .ok_or_else(|| invalid(path, format!("service {name}: bad depends_on entry")))
            })
            .collect(),
        Some(Value::Mapping(entries)) => entries
            .iter()
            .map(|(service, options)| {
                let service = service
                    .as_str()
                    .ok_or_else(|| invalid(path, format!("service {name}: bad depends_on key")))?;
                let condition = match options.get("condition").and_then(Value::as_str) {
                    None | Some("service_started") => DependencyCondition::Started,
                    Some("service_healthy") => DependencyCondition::Healthy,
                    Some("service_completed_successfully") => {
                        DependencyCondition::CompletedSuccessfully
                    }
                    Some(other) => {
                        return Err(invalid(
                            path,
                            format!("service {name}: unsupported condition {other}")
                        ));
                    }
                };
                Ok(Dependency {
                    service: service.to_string(),
                    condition
                })
            })
            .collect(),
        Some(_) => Err(invalid(path, format!("service {name}: malformed depends_on")))
    }
}

/// Kahn's algorithm, always picking the earliest-declared ready service.
fn start_order(path: &Path, services: &[ServiceSpec]) -> Result<Vec<usize>, EnvironmentError> {
    let index: BTreeMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut remaining = vec![0usize; services.len()];
    let mut dependents = vec![Vec::new(); services.len()];
    for (i, service) in services.iter().enumerate() {
        for dependency in &service.depends_on {
            let &d = index.get(dependency.service.as_str()).ok_or_else(|| {
                invalid(
                    path,
                    format!(
                        "service {} depends on undeclared service {}",
                        service.name, dependency.service
                    )
                )
            })?;
            remaining[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..services.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(services.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != services.len() {
        let cycle: Vec<&str> = services
            .iter()
            .enumerate()
            .filter(|(i, _)| remaining[*i] > 0)
            .map(|(_, s)| s.name.as_str())
            .collect();
        return Err(invalid(
            path,
            format!("dependency cycle between {}", cycle.join(", "))
        ));
    }

    Ok(order)
}
