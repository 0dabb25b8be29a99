//! Typed query-result records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the listening history joined to its track metadata.
///
/// `track_name` and `artist_name` are `None` for tracks whose metadata has
/// not been fetched yet (placeholder rows).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    /// Unix timestamp (seconds) the play started at
    pub played_at: i64,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub track_id: String,
}

impl HistoryEntry {
    /// Play start as a UTC datetime
    pub fn played_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.played_at, 0).unwrap_or_default()
    }
}

/// Aggregated play counts for one track over a date window
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopTrack {
    pub track_id: String,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    /// Unix timestamp (seconds) of the first play inside the window
    pub played_first_at: i64,
    pub play_count: i64,
}

impl TopTrack {
    pub fn played_first_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.played_first_at, 0).unwrap_or_default()
    }
}
