//! Database schema migrations
//!
//! Versioned schema migrations keyed off `PRAGMA user_version`, the
//! database's own metadata counter. Each pending migration runs inside a
//! single transaction covering its DDL, the version bump and any
//! post-migration data fixes, so a failure rolls the whole step back and
//! the store is never left half-migrated.
//!
//! # Migration guidelines
//!
//! 1. **Never modify existing migrations** - they must remain stable for
//!    databases created by older versions
//! 2. **Always add new migrations** - one entry per schema change, appended
//!    to `MIGRATIONS` with the next version number
//! 3. **Prefer ALTER TABLE** over DROP/CREATE to preserve data

use crate::backfill;
use crate::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

/// Data fixes that run after a migration's DDL, inside the same transaction.
///
/// Dispatched by an explicit match rather than by function-name lookup so
/// every post-migration step is visible at compile time.
#[derive(Debug, Clone, Copy)]
enum PostMigration {
    /// Derive `ms_played` estimates for the whole ledger
    BackfillMsPlayed,
}

impl PostMigration {
    fn name(&self) -> &'static str {
        match self {
            PostMigration::BackfillMsPlayed => "backfill_ms_played",
        }
    }

    async fn run(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<u64> {
        match self {
            PostMigration::BackfillMsPlayed => backfill::backfill_ms_played(&mut *tx, 0).await,
        }
    }
}

struct Migration {
    version: i32,
    script: &'static str,
    post: &'static [PostMigration],
}

/// Ordered schema history. The last entry's version is the current schema.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        script: r#"
            CREATE TABLE IF NOT EXISTS "tracks" (
                track_id TEXT PRIMARY KEY,
                data JSON
            );
            CREATE TABLE IF NOT EXISTS "history" (
                played_at INTEGER PRIMARY KEY,
                track_id TEXT NOT NULL,
                FOREIGN KEY (track_id)
                    REFERENCES tracks(track_id)
                        ON UPDATE RESTRICT
                        ON DELETE RESTRICT
            );
        "#,
        post: &[],
    },
    Migration {
        version: 2,
        script: "ALTER TABLE history ADD COLUMN ms_played INTEGER;",
        post: &[PostMigration::BackfillMsPlayed],
    },
];

/// Highest version defined in `MIGRATIONS`
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from the database
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: i32 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version >= CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!("Applying migration v{}", migration.version);
        let mut tx = pool.begin().await?;

        sqlx::raw_sql(migration.script).execute(&mut *tx).await?;

        // PRAGMA user_version cannot take a bind parameter
        sqlx::raw_sql(&format!("PRAGMA user_version = {}", migration.version))
            .execute(&mut *tx)
            .await?;

        for post in migration.post {
            info!("Running post-migration function {}", post.name());
            let affected = post.run(&mut tx).await?;
            info!("Function {} affected {} rows", post.name(), affected);
        }

        tx.commit().await?;
        info!("✓ Migration v{} completed", migration.version);
    }

    info!("All migrations completed successfully");
    Ok(())
}
