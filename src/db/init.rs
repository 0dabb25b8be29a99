//! Database initialization
//!
//! Creates the history database on first open and brings its schema up to
//! date before returning the pool. A migration failure aborts startup; the
//! caller never sees a partially-migrated store.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Open (or create) the history database and run pending migrations
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // foreign_keys is a per-connection pragma; setting it in the connect
    // options ensures every pooled connection enforces it
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new history database: {}", db_path.display());
    } else {
        info!("Opened history database: {}", db_path.display());
    }

    super::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema applied, for tests
#[cfg(test)]
pub(crate) async fn open_in_memory() -> SqlitePool {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    // A single connection keeps every test statement on the same in-memory
    // database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    super::migrations::run_migrations(&pool).await.unwrap();
    pool
}
