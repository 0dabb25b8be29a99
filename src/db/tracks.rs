//! Track metadata cache
//!
//! One row per track id. `data` holds the pruned metadata JSON and is NULL
//! for placeholder rows, i.e. tracks referenced by the history before their
//! details were fetched.

use crate::api::model::TrackData;
use crate::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Insert a placeholder row if the track is unknown; no-op otherwise.
///
/// INSERT OR IGNORE guarantees existing metadata is never overwritten
/// with NULL.
pub async fn ensure(conn: &mut SqliteConnection, track_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO tracks (track_id) VALUES (?)")
        .bind(track_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Insert or replace a track row with real metadata.
///
/// Only call with genuine data; replacing an existing row with NULL would
/// violate the non-clobber invariant (use [`ensure`] for placeholders).
pub async fn upsert(conn: &mut SqliteConnection, track_id: &str, track: &TrackData) -> Result<()> {
    let data = serde_json::to_string(track)?;
    sqlx::query("INSERT OR REPLACE INTO tracks (track_id, data) VALUES (?, ?)")
        .bind(track_id)
        .bind(data)
        .execute(conn)
        .await?;
    Ok(())
}

/// Track ids that still have no metadata, up to `limit` (unlimited if <= 0)
pub async fn fetch_missing(pool: &SqlitePool, limit: i64) -> Result<Vec<String>> {
    let limit = if limit <= 0 { -1 } else { limit };
    let ids = sqlx::query_scalar("SELECT track_id FROM tracks WHERE data IS NULL LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::open_in_memory;

    fn track_with_name(id: &str, name: &str) -> TrackData {
        TrackData {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    // The test pool has a single connection; verification queries go
    // through the held connection so nothing waits on the pool
    async fn stored_data(conn: &mut SqliteConnection, track_id: &str) -> Option<String> {
        sqlx::query_scalar("SELECT data FROM tracks WHERE track_id = ?")
            .bind(track_id)
            .fetch_one(conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_creates_placeholder() {
        let pool = open_in_memory().await;
        let mut conn = pool.acquire().await.unwrap();

        ensure(&mut conn, "t1").await.unwrap();
        assert_eq!(stored_data(&mut conn, "t1").await, None);
    }

    #[tokio::test]
    async fn test_placeholder_does_not_clobber_metadata() {
        let pool = open_in_memory().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert(&mut conn, "t1", &track_with_name("t1", "Song")).await.unwrap();
        let before = stored_data(&mut conn, "t1").await;
        assert!(before.is_some());

        // A later placeholder insert for the same id must leave data intact
        ensure(&mut conn, "t1").await.unwrap();
        assert_eq!(stored_data(&mut conn, "t1").await, before);
    }

    #[tokio::test]
    async fn test_upsert_replaces_placeholder() {
        let pool = open_in_memory().await;
        let mut conn = pool.acquire().await.unwrap();

        ensure(&mut conn, "t1").await.unwrap();
        upsert(&mut conn, "t1", &track_with_name("t1", "Song")).await.unwrap();

        let data = stored_data(&mut conn, "t1").await.unwrap();
        assert!(data.contains("Song"));
    }

    #[tokio::test]
    async fn test_fetch_missing_returns_only_placeholders() {
        let pool = open_in_memory().await;
        let mut conn = pool.acquire().await.unwrap();

        ensure(&mut conn, "empty1").await.unwrap();
        ensure(&mut conn, "empty2").await.unwrap();
        upsert(&mut conn, "full", &track_with_name("full", "Song")).await.unwrap();

        // Release the only connection before querying through the pool
        drop(conn);

        let mut missing = fetch_missing(&pool, -1).await.unwrap();
        missing.sort();
        assert_eq!(missing, vec!["empty1".to_string(), "empty2".to_string()]);

        let limited = fetch_missing(&pool, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_empty_when_all_tracks_known() {
        let pool = open_in_memory().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert(&mut conn, "t1", &track_with_name("t1", "One")).await.unwrap();
        upsert(&mut conn, "t2", &track_with_name("t2", "Two")).await.unwrap();
        drop(conn);

        // A store with no placeholders reports nothing to fetch, which is
        // what lets the import path skip authorization entirely
        assert!(fetch_missing(&pool, 1).await.unwrap().is_empty());
    }
}
