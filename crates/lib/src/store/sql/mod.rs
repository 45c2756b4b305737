//! SQL user store backed by sqlx.
//!
//! ## Available Databases
//!
//! - **SQLite** (feature: `sqlite`): Embedded database
//! - **PostgreSQL** (feature: `postgres`): PostgreSQL database
//!
//! Both go through sqlx's `AnyPool`, so the statements here stick to SQL both dialects
//! accept (`$N` placeholders, `ON CONFLICT .. DO UPDATE`).

pub mod schema;

use async_trait::async_trait;
use sqlx::AnyPool;
#[cfg(feature = "postgres")]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;

use super::{StoreError, UserRecord, UserStore};
use crate::Result;

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Converts sqlx errors to [`StoreError::Sqlx`] with a context message.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            StoreError::Sqlx {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// Database kind for SQL dialect selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

/// [`UserStore`] over a SQLite or PostgreSQL `users` table.
///
/// # Test Isolation
///
/// For PostgreSQL, `connect_postgres_isolated()` places the tables in a fresh schema so
/// parallel tests never see each other's users.
pub struct SqlxStore {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlxStore {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Get the database kind.
    pub fn db_kind(&self) -> DbKind {
        self.kind
    }
}

#[cfg(feature = "sqlite")]
impl SqlxStore {
    /// Open a SQLite database file, creating it if needed.
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to a SQLite database using a connection URL such as `sqlite:./users.db`.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let is_in_memory = url.contains("mode=memory");

        // A shared-cache in-memory database disappears with its last connection,
        // so keep one connection alive for the lifetime of the pool.
        let pool = if is_in_memory {
            AnyPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        } else {
            AnyPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        };

        if is_in_memory {
            sqlx::query("PRAGMA busy_timeout = 5000;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
        } else {
            sqlx::query(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;
        }

        Ok(Self {
            pool,
            kind: DbKind::Sqlite,
        })
    }

    /// Create a private in-memory SQLite database.
    pub async fn sqlite_in_memory() -> Result<Self> {
        // Unique name per instance so stores never share a database.
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect_sqlite(&url).await
    }
}

#[cfg(feature = "postgres")]
impl SqlxStore {
    /// Connect to PostgreSQL using the default search path.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        Self::connect_postgres_with_schema(url, None).await
    }

    /// Connect to PostgreSQL inside a freshly generated schema.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        // Schema names must start with a letter
        let unique_id = uuid::Uuid::new_v4().simple().to_string();
        Self::connect_postgres_with_schema(url, Some(format!("test_{unique_id}"))).await
    }

    async fn connect_postgres_with_schema(url: &str, schema_name: Option<String>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        if let Some(ref schema) = schema_name {
            let temp_pool = AnyPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .sql_context("Failed to connect to PostgreSQL")?;

            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
                .execute(&temp_pool)
                .await
                .sql_context(&format!("Failed to create schema {schema}"))?;

            temp_pool.close().await;
        }

        let is_isolated = schema_name.is_some();
        let mut pool_options = AnyPoolOptions::new();
        if is_isolated {
            // Many tests share one server; wait for a connection rather than fail
            pool_options = pool_options
                .max_connections(2)
                .acquire_timeout(std::time::Duration::from_secs(30));
        } else {
            pool_options = pool_options.max_connections(5);
        }

        let pool = pool_options
            .after_connect(move |conn, _meta| {
                let schema = schema_name.clone();
                Box::pin(async move {
                    if let Some(ref s) = schema {
                        let set_path = format!("SET search_path TO {s}");
                        conn.execute(set_path.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            pool,
            kind: DbKind::Postgres,
        })
    }
}

#[async_trait]
impl UserStore for SqlxStore {
    async fn ensure_schema(&self) -> Result<()> {
        schema::initialize(self).await
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT username, password FROM users")
            .fetch_all(&self.pool)
            .await
            .sql_context("Failed to list users")?;

        Ok(rows
            .into_iter()
            .map(|(username, password_digest)| UserRecord {
                username,
                password_digest,
            })
            .collect())
    }

    async fn upsert(&self, username: &str, password_digest: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (username, password) VALUES ($1, $2)
             ON CONFLICT (username) DO UPDATE SET password = EXCLUDED.password",
        )
        .bind(username)
        .bind(password_digest)
        .execute(&self.pool)
        .await
        .sql_context("Failed to upsert user")?;
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
            .sql_context("Failed to delete user")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        match self.kind {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
        }
    }
}
