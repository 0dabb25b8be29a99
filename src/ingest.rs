//! History ingestion engine
//!
//! Merges play events from two source shapes into the ledger/cache pair:
//! the live "recently played" feed (full track objects, no duration) and
//! bulk export files (authoritative durations, bare track URIs). Both
//! funnel through insert-or-ignore semantics, so reprocessing overlapping
//! data is always safe; the upstream `after` filter cannot be trusted and
//! the ledger is the sole dedup boundary.

use crate::api::model::PlayHistoryItem;
use crate::db::{history, tracks, InsertOutcome};
use crate::{backfill, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Ingest a batch of live-feed play events.
///
/// For each event the ledger insert is attempted optimistically with just
/// the track id; only when that fails on the foreign key is the full track
/// object written first and the insert retried. Tracks already in the
/// cache (the common case) never cost a metadata write.
///
/// All inserts share one transaction: a play event is never observable
/// without its track row. With `backfill_from` set, `ms_played` estimates
/// are derived afterwards from that watermark onward, covering the
/// previous tail row as well as everything just added. Returns the number
/// of newly added ledger rows.
pub async fn insert_play_history(
    pool: &SqlitePool,
    items: &[PlayHistoryItem],
    backfill_from: Option<i64>,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut added = 0;

    for item in items {
        let Some(track_id) = item.track.id.as_deref() else {
            // Local files carry no track id and cannot be stored
            debug!("Skipping play event without track id");
            continue;
        };
        let played_at = item.played_at.timestamp();

        let outcome = match history::insert(&mut tx, played_at, track_id, None).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_foreign_key_violation() => {
                tracks::upsert(&mut tx, track_id, &item.track).await?;
                history::insert(&mut tx, played_at, track_id, None).await?
            }
            Err(e) => return Err(e),
        };
        if outcome == InsertOutcome::Inserted {
            added += 1;
        }
    }

    tx.commit().await?;
    info!("Added {} history items", added);

    if let Some(from) = backfill_from {
        // Re-derive the previous last row too; its successor just arrived
        backfill::run_ms_played(pool, from).await?;
    }
    Ok(added)
}

/// One record of a bulk listening-history export file
#[derive(Debug, Deserialize)]
struct ExportRecord {
    ts: Option<chrono::DateTime<chrono::Utc>>,
    ms_played: Option<i64>,
    spotify_track_uri: Option<String>,
}

/// Counters reported by a bulk import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub tracks_added: u64,
    pub history_added: u64,
    pub history_updated: u64,
}

/// Parse a bulk export (a JSON array of play records) into deduplicated
/// `(played_at, track_id, ms_played)` triples.
///
/// Records missing a timestamp, duration or track URI (podcast episodes,
/// for instance) are dropped, as are records with `ms_played == 0` - the
/// track was skipped before it ever produced audio. Any nonzero duration
/// counts as a play. Export files can contain exact duplicate records;
/// set semantics collapse them before anything is written.
fn parse_export(json: &str) -> Result<BTreeSet<(i64, String, i64)>> {
    let records: Vec<ExportRecord> = serde_json::from_str(json)?;
    let mut plays = BTreeSet::new();

    for record in records {
        let (Some(ts), Some(ms_played), Some(uri)) =
            (record.ts, record.ms_played, record.spotify_track_uri)
        else {
            continue;
        };
        if ms_played == 0 {
            continue;
        }
        // Track id is the final colon-delimited URI segment
        let Some(track_id) = uri.rsplit(':').next().filter(|s| !s.is_empty()) else {
            continue;
        };
        plays.insert((ts.timestamp(), track_id.to_string(), ms_played));
    }
    Ok(plays)
}

/// Write parsed export plays into the store.
///
/// Three passes inside one transaction: placeholder track rows, ledger
/// rows, then a duration fill guarded by `ms_played IS NULL` - an export
/// window overlapping earlier imports or live-feed rows must never regress
/// a duration already present.
async fn import_plays(pool: &SqlitePool, plays: &BTreeSet<(i64, String, i64)>) -> Result<ImportStats> {
    let mut tx = pool.begin().await?;
    let mut stats = ImportStats::default();

    for (_, track_id, _) in plays {
        let result = sqlx::query("INSERT OR IGNORE INTO tracks (track_id) VALUES (?)")
            .bind(track_id)
            .execute(&mut *tx)
            .await?;
        stats.tracks_added += result.rows_affected();
    }

    for (played_at, track_id, _) in plays {
        if history::insert(&mut tx, *played_at, track_id, None).await? == InsertOutcome::Inserted {
            stats.history_added += 1;
        }
    }

    for (played_at, _, ms_played) in plays {
        let result =
            sqlx::query("UPDATE history SET ms_played = ? WHERE played_at = ? AND ms_played IS NULL")
                .bind(ms_played)
                .bind(played_at)
                .execute(&mut *tx)
                .await?;
        stats.history_updated += result.rows_affected();
    }

    tx.commit().await?;
    Ok(stats)
}

/// Import one bulk export file
pub async fn import_export_file(pool: &SqlitePool, path: &Path) -> Result<ImportStats> {
    info!("Importing listening history from {}", path.display());
    let json = std::fs::read_to_string(path)?;
    let plays = parse_export(&json)?;
    let stats = import_plays(pool, &plays).await?;
    info!(
        "Added {} tracks, {} history items; updated {} ms_played values",
        stats.tracks_added, stats.history_added, stats.history_updated
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::TrackData;
    use crate::db::init::open_in_memory;
    use chrono::{DateTime, Utc};

    fn item(played_at: i64, track_id: &str, duration_ms: i64) -> PlayHistoryItem {
        PlayHistoryItem {
            played_at: DateTime::<Utc>::from_timestamp(played_at, 0).unwrap(),
            track: TrackData {
                id: Some(track_id.to_string()),
                name: Some(format!("Track {track_id}")),
                duration_ms: Some(duration_ms),
                ..Default::default()
            },
        }
    }

    async fn history_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn orphan_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM history h LEFT JOIN tracks t ON h.track_id = t.track_id \
             WHERE t.track_id IS NULL",
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_live_ingestion_is_idempotent() {
        let pool = open_in_memory().await;
        let items = vec![item(100, "a", 60_000), item(200, "b", 60_000)];

        let first = insert_play_history(&pool, &items, None).await.unwrap();
        assert_eq!(first, 2);

        // Re-ingesting the same feed page adds nothing
        let second = insert_play_history(&pool, &items, None).await.unwrap();
        assert_eq!(second, 0);
        assert_eq!(history_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_track_is_created_then_retried() {
        let pool = open_in_memory().await;
        insert_play_history(&pool, &[item(100, "new", 60_000)], None)
            .await
            .unwrap();

        assert_eq!(history_count(&pool).await, 1);
        assert_eq!(orphan_count(&pool).await, 0);

        // The fallback path stored the full track object
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM tracks WHERE track_id = 'new'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(data.unwrap().contains("Track new"));
    }

    #[tokio::test]
    async fn test_known_track_metadata_is_not_rewritten() {
        let pool = open_in_memory().await;
        insert_play_history(&pool, &[item(100, "a", 60_000)], None)
            .await
            .unwrap();

        // Same track, different name in the incoming object: the optimistic
        // insert succeeds so the cached metadata stays untouched
        let mut changed = item(200, "a", 60_000);
        changed.track.name = Some("Renamed".to_string());
        insert_play_history(&pool, &[changed], None).await.unwrap();

        let data: Option<String> = sqlx::query_scalar("SELECT data FROM tracks WHERE track_id = 'a'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(data.unwrap().contains("Track a"));
    }

    #[tokio::test]
    async fn test_events_without_track_id_are_skipped() {
        let pool = open_in_memory().await;
        let mut local = item(100, "x", 60_000);
        local.track.id = None;

        let added = insert_play_history(&pool, &[local], None).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(history_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_live_ingestion_backfills_from_watermark() {
        let pool = open_in_memory().await;
        insert_play_history(&pool, &[item(0, "a", 200_000)], None)
            .await
            .unwrap();
        let watermark = crate::db::history::most_recent_timestamp(&pool).await.unwrap();

        // Next poll delivers the follow-up play; the previous tail row
        // becomes computable (skipped after 150s)
        insert_play_history(&pool, &[item(150, "b", 180_000)], Some(watermark))
            .await
            .unwrap();

        let ms: Vec<(i64, Option<i64>)> =
            sqlx::query_as("SELECT played_at, ms_played FROM history ORDER BY played_at")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(ms, vec![(0, Some(150_000)), (150, Some(180_000))]);
    }

    #[test]
    fn test_parse_export_filters_and_dedupes() {
        let json = r#"[
            {"ts": "2022-01-01T10:00:00Z", "ms_played": 30000, "spotify_track_uri": "spotify:track:aaa"},
            {"ts": "2022-01-01T10:00:00Z", "ms_played": 30000, "spotify_track_uri": "spotify:track:aaa"},
            {"ts": "2022-01-01T11:00:00Z", "ms_played": 0, "spotify_track_uri": "spotify:track:bbb"},
            {"ts": "2022-01-01T12:00:00Z", "ms_played": 45000},
            {"ts": null, "ms_played": 45000, "spotify_track_uri": "spotify:track:ccc"},
            {"ts": "2022-01-01T13:00:00Z", "ms_played": 60000, "spotify_track_uri": "spotify:episode:pod1"}
        ]"#;

        let plays = parse_export(json).unwrap();
        // The exact duplicate collapses, the zero-duration and incomplete
        // records drop; the episode URI still yields its tail segment
        let ids: Vec<&str> = plays.iter().map(|(_, id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "pod1"]);
    }

    #[test]
    fn test_parse_export_boundary_durations() {
        // Nonzero policy: 500ms counts as played, 0 does not
        let json = r#"[
            {"ts": "2022-01-01T10:00:00Z", "ms_played": 500, "spotify_track_uri": "spotify:track:short"},
            {"ts": "2022-01-01T11:00:00Z", "ms_played": 0, "spotify_track_uri": "spotify:track:zero"}
        ]"#;

        let plays = parse_export(json).unwrap();
        assert_eq!(plays.len(), 1);
        let (_, id, ms) = plays.iter().next().unwrap();
        assert_eq!(id, "short");
        assert_eq!(*ms, 500);
    }

    #[tokio::test]
    async fn test_import_plays_sets_durations_once() {
        let pool = open_in_memory().await;
        let plays = parse_export(
            r#"[
                {"ts": "2022-01-01T10:00:00Z", "ms_played": 30000, "spotify_track_uri": "spotify:track:aaa"},
                {"ts": "2022-01-01T10:05:00Z", "ms_played": 45000, "spotify_track_uri": "spotify:track:bbb"}
            ]"#,
        )
        .unwrap();

        let stats = import_plays(&pool, &plays).await.unwrap();
        assert_eq!(stats.tracks_added, 2);
        assert_eq!(stats.history_added, 2);
        assert_eq!(stats.history_updated, 2);
        assert_eq!(orphan_count(&pool).await, 0);

        // Re-importing the same window changes nothing: rows exist and
        // their durations are no longer NULL
        let again = import_plays(&pool, &plays).await.unwrap();
        assert_eq!(again, ImportStats::default());
    }

    #[tokio::test]
    async fn test_import_does_not_regress_live_feed_durations() {
        let pool = open_in_memory().await;

        // A live-feed row whose duration was already estimated
        insert_play_history(&pool, &[item(1_640_995_200, "aaa", 60_000)], None)
            .await
            .unwrap();
        sqlx::query("UPDATE history SET ms_played = 11111 WHERE played_at = 1640995200")
            .execute(&pool)
            .await
            .unwrap();

        // 2022-01-01T00:00:00Z == 1640995200
        let plays = parse_export(
            r#"[{"ts": "2022-01-01T00:00:00Z", "ms_played": 30000, "spotify_track_uri": "spotify:track:aaa"}]"#,
        )
        .unwrap();
        let stats = import_plays(&pool, &plays).await.unwrap();

        assert_eq!(stats.history_added, 0);
        assert_eq!(stats.history_updated, 0);
        let ms: i64 = sqlx::query_scalar("SELECT ms_played FROM history WHERE played_at = 1640995200")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(ms, 11111);
    }

    #[tokio::test]
    async fn test_import_export_file_end_to_end() {
        let pool = open_in_memory().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endsong_0.json");
        std::fs::write(
            &path,
            r#"[{"ts": "2022-01-01T10:00:00Z", "ms_played": 30000, "spotify_track_uri": "spotify:track:aaa"}]"#,
        )
        .unwrap();

        let stats = import_export_file(&pool, &path).await.unwrap();
        assert_eq!(stats.history_added, 1);
        assert_eq!(history_count(&pool).await, 1);
    }
}
