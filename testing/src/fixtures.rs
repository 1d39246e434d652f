use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Once, OnceLock};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);
static LOGGING: Once = Once::new();

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

/// Emails are not unique in the table, but tests asserting on lookups want
/// their own rows.
pub fn unique_email(prefix: &str) -> String {
    format!("{}@example.com", unique_id(prefix))
}

/// Installs a test-writer subscriber once per process.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,testcontainers=warn"))
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Whether a Docker daemon answers. Checked once per process.
pub fn docker_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        std::process::Command::new("docker")
            .args(["info", "--format", "{{.ServerVersion}}"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    })
}

pub struct PostgresFixture {
    #[allow(dead_code)]
    container: ContainerAsync<Postgres>,
    url: String
}

impl PostgresFixture {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Database settings pointing at this container.
    pub fn database_config(&self) -> config::DatabaseConfig {
        config::DatabaseConfig {
            url: self.url.clone(),
            username: "testuser".to_string(),
            password: "testpass".to_string(),
            ..config::DatabaseConfig::default()
        }
    }
}

static POSTGRES: OnceCell<Option<Result<PostgresFixture, String>>> = OnceCell::const_new();

/// One Postgres container per test process.
///
/// `None` only when no Docker daemon answers. With Docker present, a
/// container that fails to start is an error, not a skip.
pub async fn postgres() -> Option<Result<&'static PostgresFixture, String>> {
    POSTGRES
        .get_or_init(|| async {
            if !docker_available() {
                tracing::warn!("Docker not available, PostgreSQL fixture disabled");
                return None;
            }
            Some(start_postgres().await)
        })
        .await
        .as_ref()
        .map(|fixture| fixture.as_ref().map_err(Clone::clone))
}

async fn start_postgres() -> Result<PostgresFixture, String> {
    let container = Postgres::default()
        .with_db_name("testdb")
        .with_user("testuser")
        .with_password("testpass")
        .with_tag("16-alpine")
        .start()
        .await
        .map_err(|e| format!("failed to start PostgreSQL container: {e}"))?;

    let port = container
        .get_host_port_ipv4(5432)
        .await
        .map_err(|e| format!("PostgreSQL container has no host port: {e}"))?;
    let host = container
        .get_host()
        .await
        .map_or_else(|_| "localhost".to_string(), |h| h.to_string());
    let url = format!("postgres://testuser:testpass@{}:{}/testdb", host, port);
    tracing::info!("PostgreSQL fixture started on port {}", port);
    Ok(PostgresFixture { container, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_email() {
        let a = unique_email("john");
        let b = unique_email("john");
        assert_ne!(a, b);
        assert!(a.starts_with("john-") && a.ends_with("@example.com"));
    }

    #[tokio::test]
    async fn test_postgres_is_skipped_only_without_docker() {
        match postgres().await {
            None => assert!(!docker_available()),
            Some(fixture) => {
                assert!(docker_available());
                let fixture = fixture.unwrap();
                assert!(fixture.url().starts_with("postgres://testuser:testpass@"));
            }
        }
    }
}
