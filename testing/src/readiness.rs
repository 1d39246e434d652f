//! Readiness strategies.
//!
//! A strategy is armed right after its service starts and either completes
//! or fails with `ReadinessTimeout` once its own deadline has passed.

use async_trait::async_trait;
use errors::EnvironmentError;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};

use crate::runtime::ContainerRuntime;

const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// What a strategy gets to observe its service with.
#[derive(Clone)]
pub struct ProbeContext {
    pub service: String,
    pub runtime: Arc<dyn ContainerRuntime>
}

#[async_trait]
pub trait ReadinessStrategy: Send + Sync {
    /// Human readable condition, used in failures.
    fn describe(&self) -> String;

    fn timeout(&self) -> Duration;

    async fn wait(&self, ctx: ProbeContext) -> Result<(), EnvironmentError>;
}

/// Waits until `pattern` has matched `times` lines of `lines`.
///
/// Each line counts at most once. On expiry the number of matches seen so far
/// is returned as the error. A stream that ends early does not shorten the
/// wait: the full `timeout` still elapses before failing.
pub async fn await_log_pattern<S>(
    lines: S,
    pattern: &Regex,
    times: usize,
    timeout: Duration
) -> Result<(), usize>
where
    S: Stream<Item = String> + Unpin
{
    if times == 0 {
        return Ok(());
    }

    let deadline = Instant::now() + timeout;
    let mut lines = lines;
    let mut matched = 0;
    loop {
        match timeout_at(deadline, lines.next()).await {
            Ok(Some(line)) => {
                if pattern.is_match(&line) {
                    matched += 1;
                    tracing::trace!(matched, times, line = %line, "Readiness pattern matched");
                    if matched >= times {
                        return Ok(());
                    }
                }
            }
            Ok(None) => {
                sleep_until(deadline).await;
                return Err(matched);
            }
            Err(_) => return Err(matched)
        }
    }
}

/// Matches a regular expression against the service's log output.
#[derive(Debug, Clone)]
pub struct LogPatternStrategy {
    pattern: Regex,
    times: usize,
    timeout: Duration
}

impl LogPatternStrategy {
    pub fn new(pattern: &str) -> Result<Self, EnvironmentError> {
        let pattern = Regex::new(pattern).map_err(|e| EnvironmentError::Runtime {
            reason: format!("invalid readiness pattern {pattern:?}: {e}")
        })?;
        Ok(Self {
            pattern,
            times: 1,
            timeout: Duration::from_secs(60)
        })
    }

    #[must_use]
    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReadinessStrategy for LogPatternStrategy {
    fn describe(&self) -> String {
        format!("log pattern /{}/ x{}", self.pattern.as_str(), self.times)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn wait(&self, ctx: ProbeContext) -> Result<(), EnvironmentError> {
        let started = Instant::now();
        let lines = ctx.runtime.logs(&ctx.service).await?;
        let remaining = self.timeout.saturating_sub(started.elapsed());

        await_log_pattern(lines, &self.pattern, self.times, remaining)
            .await
            .map_err(|matched| EnvironmentError::ReadinessTimeout {
                service: ctx.service.clone(),
                condition: self.describe(),
                timeout: self.timeout,
                matched,
                required: self.times
            })
    }
}

/// Succeeds once a TCP connection to the published port is accepted.
#[derive(Debug, Clone)]
pub struct TcpProbeStrategy {
    port: u16,
    timeout: Duration
}

impl TcpProbeStrategy {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(60)
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReadinessStrategy for TcpProbeStrategy {
    fn describe(&self) -> String {
        format!("tcp connect to port {}", self.port)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn wait(&self, ctx: ProbeContext) -> Result<(), EnvironmentError> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0;
        while Instant::now() < deadline {
            attempts += 1;
            if let Some(binding) = ctx.runtime.port(&ctx.service, self.port).await? {
                let connect = tokio::net::TcpStream::connect((binding.host.as_str(), binding.port));
                if let Ok(Ok(_)) = timeout_at(deadline, connect).await {
                    tracing::debug!(service = %ctx.service, %binding, attempts, "TCP probe succeeded");
                    return Ok(());
                }
            }
            sleep(PROBE_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        Err(EnvironmentError::ReadinessTimeout {
            service: ctx.service.clone(),
            condition: self.describe(),
            timeout: self.timeout,
            matched: 0,
            required: 1
        })
    }
}

/// Polls an HTTP path on the published port until it answers 2xx.
#[derive(Debug, Clone)]
pub struct HttpHealthStrategy {
    port: u16,
    path: String,
    timeout: Duration
}

impl HttpHealthStrategy {
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into(),
            timeout: Duration::from_secs(60)
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReadinessStrategy for HttpHealthStrategy {
    fn describe(&self) -> String {
        format!("http GET {} on port {} returns 2xx", self.path, self.port)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn wait(&self, ctx: ProbeContext) -> Result<(), EnvironmentError> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_INTERVAL * 4)
            .build()
            .map_err(|e| EnvironmentError::Runtime {
                reason: format!("cannot build http client: {e}")
            })?;

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            if let Some(binding) = ctx.runtime.port(&ctx.service, self.port).await? {
                let url = format!("http://{binding}{}", self.path);
                match client.get(&url).send().await {
                    Ok(response) if response.status().is_success() => {
                        tracing::debug!(service = %ctx.service, %url, "HTTP health probe succeeded");
                        return Ok(());
                    }
                    Ok(response) => {
                        tracing::trace!(service = %ctx.service, status = %response.status(), "Not healthy yet");
                    }
                    Err(e) => tracing::trace!(service = %ctx.service, error = %e, "Not reachable yet")
                }
            }
            sleep(PROBE_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        Err(EnvironmentError::ReadinessTimeout {
            service: ctx.service.clone(),
            condition: self.describe(),
            timeout: self.timeout,
            matched: 0,
            required: 1
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const MARKER: &str = "migration update executed successfully";

    fn marker() -> Regex {
        Regex::new(MARKER).unwrap()
    }

    /// Emits `lines` one per `gap`, then stays open like a followed log.
    fn followed(lines: Vec<&'static str>, gap: Duration) -> impl Stream<Item = String> + Unpin {
        Box::pin(
            stream::iter(lines)
                .then(move |line| async move {
                    sleep(gap).await;
                    line.to_string()
                })
                .chain(stream::pending())
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_kth_match_not_before() {
        let gap = Duration::from_secs(1);
        let started = Instant::now();
        let result = await_log_pattern(
            followed(vec!["starting", MARKER, "noise", MARKER, MARKER], gap),
            &marker(),
            2,
            Duration::from_secs(60)
        )
        .await;
        assert_eq!(result, Ok(()));
        // Second marker is the fourth line.
        assert_eq!(started.elapsed(), gap * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_k_minus_one_matches_times_out() {
        let timeout = Duration::from_secs(120);
        let started = Instant::now();
        let result = await_log_pattern(
            followed(vec![MARKER, "noise"], Duration::from_secs(1)),
            &marker(),
            2,
            timeout
        )
        .await;
        assert_eq!(result, Err(1));
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_stream_still_waits_full_timeout() {
        let timeout = Duration::from_secs(30);
        let started = Instant::now();
        let lines = stream::iter(vec!["only line".to_string()]);
        let result = await_log_pattern(lines, &marker(), 1, timeout).await;
        assert_eq!(result, Err(0));
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn test_zero_times_is_immediately_ready() {
        let result =
            await_log_pattern(stream::pending::<String>(), &marker(), 0, Duration::from_secs(1)).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_each_line_counts_once() {
        let lines = stream::iter(vec![format!("{MARKER} {MARKER}")]).chain(stream::pending());
        let result = await_log_pattern(lines, &marker(), 2, Duration::from_millis(10)).await;
        assert_eq!(result, Err(1));
    }

    #[test]
    fn test_describe_and_invalid_pattern() {
        let strategy = LogPatternStrategy::new(MARKER).unwrap().times(1);
        assert_eq!(
            strategy.describe(),
            "log pattern /migration update executed successfully/ x1"
        );
        assert!(LogPatternStrategy::new("(unclosed").is_err());
        assert_eq!(
            TcpProbeStrategy::new(5432).describe(),
            "tcp connect to port 5432"
        );
    }
}
