//! In-process `ContainerRuntime` that plays back a script.

use async_trait::async_trait;
use errors::EnvironmentError;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::runtime::{ContainerRuntime, HostBinding};
use crate::topology::Topology;

#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    events: Arc<Mutex<Vec<String>>>,
    logs: HashMap<String, Vec<(Duration, String)>>,
    ports: HashMap<(String, u16), u16>,
    start_delays: HashMap<String, Duration>,
    start_failures: HashMap<String, String>
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a log line emitted `after` the previous one.
    pub(crate) fn log(mut self, service: &str, after: Duration, line: &str) -> Self {
        self.logs
            .entry(service.to_string())
            .or_default()
            .push((after, line.to_string()));
        self
    }

    pub(crate) fn publish(mut self, service: &str, port: u16, host_port: u16) -> Self {
        self.ports.insert((service.to_string(), port), host_port);
        self
    }

    pub(crate) fn slow_start(mut self, service: &str, delay: Duration) -> Self {
        self.start_delays.insert(service.to_string(), delay);
        self
    }

    pub(crate) fn failing_start(mut self, service: &str, reason: &str) -> Self {
        self.start_failures
            .insert(service.to_string(), reason.to_string());
        self
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    fn project(&self) -> &str {
        "scripted"
    }

    async fn prepare(&self, _topology: &Topology) -> Result<(), EnvironmentError> {
        self.record("prepare".to_string());
        Ok(())
    }

    async fn start_service(&self, service: &str) -> Result<(), EnvironmentError> {
        self.record(format!("start {service}"));
        if let Some(delay) = self.start_delays.get(service) {
            tokio::time::sleep(*delay).await;
        }
        match self.start_failures.get(service) {
            Some(reason) => Err(EnvironmentError::ServiceStartFailed {
                service: service.to_string(),
                reason: reason.clone()
            }),
            None => Ok(())
        }
    }

    async fn logs(&self, service: &str) -> Result<BoxStream<'static, String>, EnvironmentError> {
        self.record(format!("logs {service}"));
        let script = self.logs.get(service).cloned().unwrap_or_default();
        let events = Arc::clone(&self.events);
        let service = service.to_string();

        // Stays open after the script, like a followed log.
        Ok(stream::iter(script)
            .then(move |(after, line)| {
                let events = Arc::clone(&events);
                let service = service.clone();
                async move {
                    tokio::time::sleep(after).await;
                    events.lock().unwrap().push(format!("log {service}: {line}"));
                    line
                }
            })
            .chain(stream::pending())
            .boxed())
    }

    async fn port(
        &self,
        service: &str,
        port: u16
    ) -> Result<Option<HostBinding>, EnvironmentError> {
        self.record(format!("port {service}:{port}"));
        Ok(self
            .ports
            .get(&(service.to_string(), port))
            .map(|&host_port| HostBinding {
                host: "localhost".to_string(),
                port: host_port
            }))
    }

    fn teardown(&self) -> Result<(), EnvironmentError> {
        self.record("teardown".to_string());
        Ok(())
    }
}
