//! # Database Migration Management
//!
//! Schema evolution through SQL embedded in the binary and executed on
//! startup. Applied versions are tracked in `schema_migrations` so reruns
//! are cheap no-ops.
//!
//! Emails are normalised (lower-cased, trimmed) before they reach the store,
//! so the plain UNIQUE index on `users.email` gives case-insensitive
//! uniqueness. The three parameter sets of an intersection are stored as
//! JSON documents in TEXT columns.

use sqlx::Row;
use tracing::info;

use crate::errors::{Result, ServiceError};
use crate::storage::DbPool;

/// Ordered list of embedded migrations.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "create users tables",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_intersections (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            intersection_id TEXT NOT NULL,
            PRIMARY KEY (user_id, intersection_id)
        );
        "#,
    ),
    (
        2,
        "create intersections table",
        r#"
        CREATE TABLE IF NOT EXISTS intersections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            city TEXT NOT NULL,
            province TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            last_run_at TIMESTAMP NOT NULL,
            status TEXT NOT NULL,
            run_count INTEGER NOT NULL DEFAULT 0,
            traffic_density TEXT NOT NULL,
            default_parameters TEXT NOT NULL,
            best_parameters TEXT NOT NULL,
            current_parameters TEXT NOT NULL
        );
        "#,
    ),
];

/// Run all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            installed_on TIMESTAMP NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(|err| ServiceError::database(err, "failed to create migration table"))?;

    let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to read applied migrations"))?
        .into_iter()
        .map(|row| row.get::<i64, _>("version"))
        .collect();

    let mut migrations_run = 0;
    for (version, description, sql) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }

        // Each migration may contain several statements.
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(pool).await.map_err(|err| {
                ServiceError::database(err, format!("migration {version} ({description}) failed"))
            })?;
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, description, installed_on) VALUES ($1, $2, $3)",
        )
        .bind(version)
        .bind(description)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await
        .map_err(|err| ServiceError::database(err, "failed to record migration"))?;

        migrations_run += 1;
    }

    if migrations_run > 0 {
        info!(migrations_run, "database migrations applied");
    }

    Ok(())
}
