use async_trait::async_trait;
use config::DatabaseConfig;
use domain::{NewPerson, Page, PageRequest, Person, PersonId, PersonPatch, PersonStore};
use errors::StorageError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{AssertSqlSafe, FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// Schema migration shared with the migration service of the test environment.
pub const MIGRATION_SQL: &str = include_str!("../migrations/001_create_person.sql");

/// Schema the migration creates the `person` table in.
pub const PERSON_SCHEMA: &str = "testcontainer";

const BACKEND: &str = "postgres";

#[derive(Debug, FromRow)]
struct PersonRow {
    id: i32,
    name: Option<String>,
    email: Option<String>,
    age: Option<i32>
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            age: row.age
        }
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        reason: e.to_string()
    }
}

/// Opens a pool from `config`.
///
/// `username`/`password` override credentials embedded in the url; `schema`
/// becomes the connection `search_path`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StorageError> {
    let connection_error = |reason: String| StorageError::ConnectionError {
        backend: BACKEND.to_string(),
        reason
    };

    let mut options =
        PgConnectOptions::from_str(&config.url).map_err(|e| connection_error(e.to_string()))?;
    if !config.username.is_empty() {
        options = options.username(&config.username);
    }
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if let Some(schema) = &config.schema {
        options = options.options([("search_path", schema.as_str())]);
    }

    tracing::info!(
        schema = ?config.schema,
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .connect_with(options)
        .await
        .map_err(|e| connection_error(e.to_string()))
}

/// `PersonStore` backed by the `person` table.
///
/// Queries use unqualified table names; the pool's `search_path` decides
/// which schema they hit.
#[derive(Clone)]
pub struct PersonRepository {
    pool: PgPool
}

impl PersonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies `MIGRATION_SQL` directly, for databases no migration service
    /// has touched.
    pub async fn initialize_schema(&self) -> Result<(), StorageError> {
        for statement in MIGRATION_SQL
            .split(';')
            .map(strip_comments)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(AssertSqlSafe(statement.as_str()))
                .execute(&self.pool)
                .await
                .map_err(query_error)?;
        }
        Ok(())
    }
}

fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[async_trait]
impl PersonStore for PersonRepository {
    async fn create(&self, person: NewPerson) -> Result<Person, StorageError> {
        let row: PersonRow = sqlx::query_as(
            "INSERT INTO person (name, email, age) VALUES ($1, $2, $3)
             RETURNING id, name, email, age"
        )
        .bind(&person.name)
        .bind(&person.email)
        .bind(person.age)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        tracing::debug!(id = row.id, "Created person");
        Ok(row.into())
    }

    async fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, StorageError> {
        let row: Option<PersonRow> =
            sqlx::query_as("SELECT id, name, email, age FROM person WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(row.map(Person::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, StorageError> {
        let row: Option<PersonRow> = sqlx::query_as(
            "SELECT id, name, email, age FROM person WHERE email = $1 ORDER BY id LIMIT 1"
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(Person::from))
    }

    async fn list(&self, request: &PageRequest) -> Result<Page<Person>, StorageError> {
        let total = self.count().await?;

        // Column and keyword come from closed enums, never from user text.
        let order_by = match request.sort {
            Some(sort) => format!(
                "{} {}, id ASC",
                sort.field.column(),
                sort.direction.keyword()
            ),
            None => "id ASC".to_string()
        };
        let sql = format!(
            "SELECT id, name, email, age FROM person ORDER BY {order_by} LIMIT $1 OFFSET $2"
        );

        let rows: Vec<PersonRow> = sqlx::query_as(AssertSqlSafe(sql.as_str()))
            .bind(i64::from(request.size))
            .bind(i64::try_from(request.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(Page {
            items: rows.into_iter().map(Person::from).collect(),
            number: request.page,
            size: request.size,
            total_elements: total
        })
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM person")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn replace(
        &self,
        id: PersonId,
        person: NewPerson
    ) -> Result<Option<Person>, StorageError> {
        let row: Option<PersonRow> = sqlx::query_as(
            "UPDATE person SET name = $2, email = $3, age = $4 WHERE id = $1
             RETURNING id, name, email, age"
        )
        .bind(id)
        .bind(&person.name)
        .bind(&person.email)
        .bind(person.age)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(Person::from))
    }

    async fn patch(
        &self,
        id: PersonId,
        patch: PersonPatch
    ) -> Result<Option<Person>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let current: Option<PersonRow> =
            sqlx::query_as("SELECT id, name, email, age FROM person WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_error)?;

        let Some(current) = current else {
            return Ok(None);
        };

        let mut person = Person::from(current);
        patch.apply(&mut person);

        sqlx::query("UPDATE person SET name = $2, email = $3, age = $4 WHERE id = $1")
            .bind(id)
            .bind(&person.name)
            .bind(&person.email)
            .bind(person.age)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some(person))
    }

    async fn delete(&self, id: PersonId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM person WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                reason: e.to_string()
            })?;
        Ok(())
    }
}
