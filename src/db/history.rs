//! Play history ledger and read-side queries
//!
//! Append-only record of plays keyed by the play's start timestamp in epoch
//! seconds. The upstream feed reports plays at one-second granularity, so
//! the timestamp alone is assumed globally unique and serves as the primary
//! key; this is a hard assumption about the feed, not a derived choice.

use crate::db::models::{HistoryEntry, TopTrack};
use crate::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

/// Result of a ledger insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was added
    Inserted,
    /// A row with this timestamp already exists; nothing was written
    Duplicate,
}

/// Attempt to insert a play.
///
/// A duplicate timestamp is an expected outcome, not an error: reprocessing
/// the same feed page is safe. A missing track row surfaces as a
/// foreign-key error for the caller's create-then-retry path (OR IGNORE
/// does not swallow foreign-key violations).
pub async fn insert(
    conn: &mut SqliteConnection,
    played_at: i64,
    track_id: &str,
    ms_played: Option<i64>,
) -> Result<InsertOutcome> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO history (played_at, track_id, ms_played) VALUES (?, ?, ?)",
    )
    .bind(played_at)
    .bind(track_id)
    .bind(ms_played)
    .execute(conn)
    .await?;

    if result.rows_affected() > 0 {
        Ok(InsertOutcome::Inserted)
    } else {
        Ok(InsertOutcome::Duplicate)
    }
}

/// Most recent stored timestamp, or 0 when the ledger is empty.
///
/// Used as the watermark for incremental pulls of the live feed.
pub async fn most_recent_timestamp(pool: &SqlitePool) -> Result<i64> {
    let timestamp: Option<i64> = sqlx::query_scalar("SELECT MAX(played_at) FROM history")
        .fetch_one(pool)
        .await?;
    Ok(timestamp.unwrap_or(0))
}

/// History entries ordered by timestamp ascending, optionally bounded by an
/// inclusive window. `limit <= 0` means unlimited.
pub async fn get_history(
    pool: &SqlitePool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<HistoryEntry>> {
    let mut sql = String::from(
        r#"
        SELECT
            h.played_at,
            json_extract(t.data, '$.name') AS track_name,
            json_extract(t.data, '$.artists[0].name') AS artist_name,
            h.track_id
        FROM history h
        JOIN tracks t ON h.track_id = t.track_id
        "#,
    );
    match (start, end) {
        (Some(_), Some(_)) => sql.push_str("WHERE h.played_at BETWEEN ? AND ? "),
        (Some(_), None) => sql.push_str("WHERE h.played_at >= ? "),
        (None, Some(_)) => sql.push_str("WHERE h.played_at <= ? "),
        (None, None) => {}
    }
    sql.push_str("ORDER BY h.played_at ASC LIMIT ?");

    // SQLite treats a negative LIMIT as unlimited, but LIMIT 0 returns
    // nothing; normalize so every non-positive limit means unlimited
    let limit = if limit <= 0 { -1 } else { limit };

    let mut query = sqlx::query_as::<_, HistoryEntry>(&sql);
    if let Some(start) = start {
        query = query.bind(start.timestamp());
    }
    if let Some(end) = end {
        query = query.bind(end.timestamp());
    }
    let entries = query.bind(limit).fetch_all(pool).await?;
    Ok(entries)
}

/// Per-track play counts over an inclusive date window, ordered by play
/// count descending with first-played ascending as the deterministic
/// tie-break. `limit <= 0` means unlimited.
pub async fn get_top_tracks(
    pool: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
    limit: i64,
) -> Result<Vec<TopTrack>> {
    let limit = if limit <= 0 { -1 } else { limit };
    let tracks = sqlx::query_as::<_, TopTrack>(
        r#"
        SELECT
            t.track_id,
            json_extract(t.data, '$.name') AS track_name,
            json_extract(t.data, '$.artists[0].name') AS artist_name,
            MIN(h.played_at) AS played_first_at,
            COUNT(h.track_id) AS play_count
        FROM history h
        JOIN tracks t ON h.track_id = t.track_id
        WHERE date(h.played_at, 'unixepoch') BETWEEN date(?) AND date(?)
        GROUP BY t.track_id
        ORDER BY play_count DESC, played_first_at ASC
        LIMIT ?
        "#,
    )
    .bind(start.format("%Y-%m-%d").to_string())
    .bind(end.format("%Y-%m-%d").to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(tracks)
}

/// Top tracks for this calendar day `years` years ago
pub async fn get_today_years_ago(
    pool: &SqlitePool,
    years: i32,
    limit: i64,
) -> Result<Vec<TopTrack>> {
    let today = Utc::now().date_naive();
    // Feb 29 has no anniversary in a non-leap year; fall back to Feb 28
    let day = today
        .with_year(today.year() - years)
        .or_else(|| today.pred_opt().and_then(|d| d.with_year(today.year() - years)))
        .unwrap_or(today);
    get_top_tracks(pool, day, day, limit).await
}
