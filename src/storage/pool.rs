//! # Database Connection Pool Management
//!
//! Connection pool creation shared by both services. The pool handle is
//! process-wide and cloned into every repository; SQLx guarantees pool
//! safety across concurrent request handlers.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::sanitize_url;
use crate::errors::{Result, ServiceError};

/// Type alias for the database connection pool.
pub type DbPool = Pool<Sqlite>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 10;

/// Create a database connection pool for the given connection string.
///
/// Migrations run automatically so a freshly provisioned volume is usable;
/// a connection failure here is fatal to startup by design.
pub async fn create_pool(url: &str) -> Result<DbPool> {
    if !url.starts_with("sqlite:") {
        return Err(ServiceError::validation(format!(
            "unsupported database URL '{}': expected a sqlite: connection string",
            sanitize_url(url)
        )));
    }

    let connect_options = SqliteConnectOptions::from_str(url)
        .map_err(|err| ServiceError::database(err, format!("invalid connection string: {}", sanitize_url(url))))?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal);

    // Each sqlite :memory: connection is its own database, so an in-memory
    // pool must stay at a single connection or later acquires see no schema.
    let max_connections = if url.contains(":memory:") { 1 } else { MAX_CONNECTIONS };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, url = %sanitize_url(url), "failed to create database pool");
            ServiceError::database(err, format!("failed to connect to database: {}", sanitize_url(url)))
        })?;

    tracing::info!(
        url = %sanitize_url(url),
        max_connections,
        "database connection pool created"
    );

    crate::storage::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Check database connectivity.
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|err| ServiceError::database(err, "database connectivity check failed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_in_memory() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn create_pool_rejects_foreign_schemes() {
        let result = create_pool("mysql://localhost/test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_pool_creates_missing_database_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swift.db");
        let url = format!("sqlite://{}", path.display());

        let pool = create_pool(&url).await.unwrap();
        check_connection(&pool).await.unwrap();
        assert!(path.exists());
    }
}
