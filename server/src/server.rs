//! Server setup and lifecycle for the person server.

use config::{Config, ConfigLoader, ObservabilityConfig, config_file_from_env};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::error::{ApiError, Result};
use crate::routes::create_router;
use crate::state::AppState;

/// The person HTTP server.
pub struct PersonServer {
    state: Arc<AppState>
}

impl PersonServer {
    /// Creates a new server instance, connecting to the configured database.
    pub async fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::new(config).await?);
        Ok(Self { state })
    }

    /// Creates a server instance from an existing `AppState`.
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Runs the HTTP server until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let server = &self.state.config.server;
        let addr = bind_addr(&server.host, server.port)?;

        let router = create_router(self.state.clone());

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!(%addr, "Person server starting");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {e}")))?;

        tracing::info!("Person server stopped");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Accepts IPv4 and IPv6 literals, with or without brackets.
fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let literal = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let ip: IpAddr = literal
        .parse()
        .map_err(|e| ApiError::Server(format!("Invalid address {host}: {e}")))?;
    Ok(SocketAddr::new(ip, port))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if observability.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Creates and runs the server.
pub async fn run_server(config: Config) -> Result<()> {
    let server = PersonServer::new(config).await?;
    server.run().await
}

/// Loads configuration from `APP_CONFIG_FILE` and the environment, then runs.
pub async fn run_from_env() -> Result<()> {
    let config = ConfigLoader::new()
        .with_optional_file(config_file_from_env())
        .with_env()
        .load()?;

    init_tracing(&config.observability);
    tracing::info!(config = ?config, "Configuration loaded");

    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr_accepts_ipv4_and_ipv6() {
        assert_eq!(bind_addr("0.0.0.0", 8080).unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(bind_addr("::", 8080).unwrap().to_string(), "[::]:8080");
        assert_eq!(bind_addr("[::1]", 9000).unwrap().to_string(), "[::1]:9000");
    }

    #[test]
    fn test_bind_addr_rejects_non_literal_host() {
        assert!(matches!(
            bind_addr("not an address", 8080),
            Err(ApiError::Server(_))
        ));
    }
}
