//! Database connection pool and migrations.
//!
//! Call [`connect`] (or [`create_pool`] for a bare URL) at startup. It opens
//! the SQLite database and runs all pending migrations via `sqlx::migrate!`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::StoreError;

/// Create a SQLite connection pool with default settings and run all
/// pending migrations.
///
/// `database_url` must be a valid SQLite connection string, e.g.:
/// - `"sqlite://stellar_fees.db"`: file-based database
/// - `"sqlite::memory:"`: in-memory database shared by the pool (tests)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    connect(&Config::with_database_url(database_url)).await
}

/// Open a pool using the pool size and busy timeout from `config`,
/// then migrate.
///
/// File databases are created if missing and switched to WAL so readers
/// do not block the writers. Concurrent writers wait up to the busy
/// timeout for the write lock.
pub async fn connect(config: &Config) -> Result<SqlitePool, StoreError> {
    let mut options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    if !is_in_memory(&config.database_url) {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    tracing::info!(
        "Connected to {} (max {} connections)",
        config.database_url,
        config.max_connections
    );

    Ok(pool)
}

/// Apply every embedded migration not yet recorded in `_sqlx_migrations`.
/// Safe to call repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("Migrations up to date");
    Ok(())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
