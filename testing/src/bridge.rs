//! Turns resolved port bindings into application configuration.

use config::ConfigOverlay;
use config::overlay::{DATABASE_PASSWORD, DATABASE_SCHEMA, DATABASE_URL, DATABASE_USERNAME};
use errors::EnvironmentError;

use crate::launcher::Environment;

/// Source name reported when the overlay is merged.
pub const OVERLAY_SOURCE: &str = "test environment";

/// How to reach a Postgres service of the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasourceBinding {
    pub service: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub schema: Option<String>
}

impl DatasourceBinding {
    /// Stock `postgres` image credentials.
    pub fn postgres(service: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            port,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            schema: None
        }
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationBridge {
    datasource: DatasourceBinding
}

impl ConfigurationBridge {
    #[must_use]
    pub fn new(datasource: DatasourceBinding) -> Self {
        Self { datasource }
    }

    #[must_use]
    pub fn datasource(&self) -> &DatasourceBinding {
        &self.datasource
    }

    /// Builds the overlay for a launched environment.
    ///
    /// A disabled environment yields an empty overlay, leaving the
    /// application on its static configuration.
    pub fn overlay(&self, environment: &Environment) -> Result<ConfigOverlay, EnvironmentError> {
        let Some(running) = environment.running() else {
            tracing::warn!("Test environment disabled, application keeps its static configuration");
            return Ok(ConfigOverlay::empty(OVERLAY_SOURCE));
        };

        let ds = &self.datasource;
        let binding = running.binding(&ds.service, ds.port)?;
        let url = format!("postgres://{}:{}/{}", binding.host, binding.port, ds.database);
        tracing::info!(service = %ds.service, url = %url, "Bridging datasource into configuration");

        ConfigOverlay::builder(OVERLAY_SOURCE)
            .set(DATABASE_URL, url)
            .set(DATABASE_USERNAME, ds.username.as_str())
            .set(DATABASE_PASSWORD, ds.password.as_str())
            .set_opt(DATABASE_SCHEMA, ds.schema.as_deref())
            .build()
            .map_err(|e| EnvironmentError::ConfigurationBindingFailure {
                service: ds.service.clone(),
                port: ds.port,
                reason: e.to_string()
            })
    }
}
