//! Application state for the person server.

use config::Config;
use domain::PersonStore;
use std::sync::Arc;
use storage::PersonRepository;

use crate::error::Result;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<dyn PersonStore>,
    pub config: Arc<Config>
}

impl AppState {
    /// Connects to the database described by `config`.
    pub async fn new(config: Config) -> Result<Self> {
        if config.database.is_placeholder() {
            tracing::warn!(
                url = %config.database.url,
                "Database url is the built-in placeholder; no environment overlay was applied"
            );
        }

        let pool = storage::connect(&config.database).await?;
        let store: Arc<dyn PersonStore> = Arc::new(PersonRepository::new(pool));

        Ok(Self {
            store,
            config: Arc::new(config)
        })
    }

    /// Wraps an existing store, used by tests and embedders.
    pub fn with_store(store: Arc<dyn PersonStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config)
        }
    }
}
