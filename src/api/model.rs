//! Typed records for the Spotify Web API
//!
//! `TrackData` is the explicit allow-list of track metadata that gets
//! persisted: deserializing a full API track object through it drops the
//! noisy fields (available markets, images, preview/external URLs, href)
//! that would otherwise dominate storage growth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artist reference as embedded in track objects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
}

/// Album reference as embedded in track objects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<i64>,
}

/// Retained track metadata schema.
///
/// Everything not listed here is discarded at the deserialization boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackData {
    /// Spotify track id; None for local files, which cannot be stored
    pub id: Option<String>,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub duration_ms: Option<i64>,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub is_local: Option<bool>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumRef>,
    pub external_ids: Option<serde_json::Value>,
}

/// One entry of the "recently played" feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHistoryItem {
    pub played_at: DateTime<Utc>,
    pub track: TrackData,
}

/// Saved-item categories, mapped explicitly to their library endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedKind {
    Albums,
    Episodes,
    Shows,
    Tracks,
}

impl SavedKind {
    pub const ALL: [SavedKind; 4] = [
        SavedKind::Albums,
        SavedKind::Episodes,
        SavedKind::Shows,
        SavedKind::Tracks,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            SavedKind::Albums => "me/albums",
            SavedKind::Episodes => "me/episodes",
            SavedKind::Shows => "me/shows",
            SavedKind::Tracks => "me/tracks",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SavedKind::Albums => "albums",
            SavedKind::Episodes => "episodes",
            SavedKind::Shows => "shows",
            SavedKind::Tracks => "tracks",
        }
    }
}

/// Top-item categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKind {
    Artists,
    Tracks,
}

impl TopKind {
    pub const ALL: [TopKind; 2] = [TopKind::Artists, TopKind::Tracks];

    pub fn endpoint(&self) -> &'static str {
        match self {
            TopKind::Artists => "me/top/artists",
            TopKind::Tracks => "me/top/tracks",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TopKind::Artists => "artists",
            TopKind::Tracks => "tracks",
        }
    }
}

/// Time ranges accepted by the top-items endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [
        TimeRange::ShortTerm,
        TimeRange::MediumTerm,
        TimeRange::LongTerm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_data_drops_noisy_fields() {
        let raw = serde_json::json!({
            "id": "abc123",
            "name": "Song",
            "uri": "spotify:track:abc123",
            "duration_ms": 200000,
            "available_markets": ["DE", "US", "GB"],
            "preview_url": "https://p.scdn.co/mp3-preview/xyz",
            "href": "https://api.spotify.com/v1/tracks/abc123",
            "external_urls": {"spotify": "https://open.spotify.com/track/abc123"},
            "album": {
                "id": "alb1",
                "name": "Album",
                "images": [{"url": "https://i.scdn.co/image/1", "width": 640, "height": 640}],
                "available_markets": ["DE"]
            },
            "artists": [{"id": "art1", "name": "Artist", "href": "https://api.spotify.com/v1/artists/art1"}]
        });

        let track: TrackData = serde_json::from_value(raw).unwrap();
        let stored = serde_json::to_value(&track).unwrap();

        assert_eq!(stored["name"], "Song");
        assert_eq!(stored["duration_ms"], 200000);
        assert_eq!(stored["artists"][0]["name"], "Artist");
        assert!(stored.get("available_markets").is_none());
        assert!(stored.get("preview_url").is_none());
        assert!(stored.get("href").is_none());
        assert!(stored.get("external_urls").is_none());
        assert!(stored["album"].get("images").is_none());
    }

    #[test]
    fn test_play_history_item_parses_feed_timestamp() {
        let raw = serde_json::json!({
            "played_at": "2024-03-01T12:30:45.123Z",
            "track": {"id": "abc", "name": "Song", "duration_ms": 1000}
        });

        let item: PlayHistoryItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.track.id.as_deref(), Some("abc"));
        assert_eq!(item.played_at.timestamp(), 1_709_296_245);
    }
}
