//! Retroactive derivation of data missing at ingestion time
//!
//! Two backfill passes: `ms_played` estimation from ledger ordering (no
//! external calls), and track metadata resolution via batched API lookups.

use crate::api::SpotifyClient;
use crate::db::tracks;
use crate::Result;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    played_at: i64,
    duration_ms: Option<i64>,
    ms_played: Option<i64>,
}

/// Estimate `ms_played` for ledger rows from `backfill_from` onward where
/// it is still NULL.
///
/// The live feed only reports when a play started; the time until the next
/// play serves as a proxy for how long the track ran. For each row missing
/// a value:
/// - next play started before this track could have finished: the user
///   skipped ahead, `ms_played` = gap to the next play in milliseconds
/// - otherwise (including the final row): assume full completion,
///   `ms_played` = the track's declared duration
///
/// Rows whose track has no known duration are left NULL until their
/// metadata arrives. Updates are guarded by `ms_played IS NULL` so a value
/// that arrived from an authoritative export meanwhile is never replaced.
/// Returns the number of rows updated; a second run over the same data is
/// a no-op.
pub async fn backfill_ms_played(conn: &mut SqliteConnection, backfill_from: i64) -> Result<u64> {
    let rows: Vec<LedgerRow> = sqlx::query_as(
        r#"
        SELECT
            h.played_at,
            json_extract(t.data, '$.duration_ms') AS duration_ms,
            h.ms_played
        FROM history h
        JOIN tracks t ON h.track_id = t.track_id
        WHERE h.played_at >= ?
        ORDER BY h.played_at
        "#,
    )
    .bind(backfill_from)
    .fetch_all(&mut *conn)
    .await?;

    let mut estimates: Vec<(i64, i64)> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.ms_played.is_some() {
            continue;
        }
        let Some(duration_ms) = row.duration_ms else {
            continue;
        };

        let estimate = match rows.get(idx + 1) {
            Some(next) => {
                // Compare in milliseconds to avoid truncating sub-second
                // track durations
                let full_play_end_ms = row.played_at * 1000 + duration_ms;
                if next.played_at * 1000 < full_play_end_ms {
                    (next.played_at - row.played_at) * 1000
                } else {
                    duration_ms
                }
            }
            // Last known play: assume it ran to completion
            None => duration_ms,
        };
        estimates.push((row.played_at, estimate));
    }

    let mut updated = 0;
    for (played_at, ms_played) in estimates {
        let result =
            sqlx::query("UPDATE history SET ms_played = ? WHERE played_at = ? AND ms_played IS NULL")
                .bind(ms_played)
                .bind(played_at)
                .execute(&mut *conn)
                .await?;
        updated += result.rows_affected();
    }

    info!("Backfilled {} ms_played values", updated);
    Ok(updated)
}

/// Transactional wrapper around [`backfill_ms_played`]
pub async fn run_ms_played(pool: &SqlitePool, backfill_from: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let updated = backfill_ms_played(&mut tx, backfill_from).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Fetch metadata for every placeholder track via the API, in batches of
/// 50 with a commit after each batch.
///
/// An API failure aborts the call, but batches committed before the
/// failure stand; re-running resumes with whatever is still missing.
pub async fn backfill_track_data(pool: &SqlitePool, client: &SpotifyClient) -> Result<u64> {
    let track_ids = tracks::fetch_missing(pool, -1).await?;
    let total = track_ids.len();
    if total == 0 {
        return Ok(0);
    }
    info!("Backfilling metadata for {} tracks", total);

    let mut backfilled = 0;
    for batch in track_ids.chunks(crate::api::client::TRACK_LOOKUP_BATCH) {
        let fetched = client.fetch_tracks(batch).await?;

        let mut tx = pool.begin().await?;
        for track in &fetched {
            if let Some(id) = &track.id {
                tracks::upsert(&mut tx, id, track).await?;
                backfilled += 1;
            }
        }
        tx.commit().await?;
        info!("Backfilled {} of {} tracks", backfilled, total);
    }
    Ok(backfilled)
}
