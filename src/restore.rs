//! Restore playlists from backup files or history queries

use crate::api::SpotifyClient;
use crate::db::models::HistoryEntry;
use crate::{Error, Result};
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Recreate a playlist from a backup dump as a new private playlist named
/// `Restore [YYYY-MM-DD] <original name>`. There may be several playlists
/// with the original name; the dated prefix keeps them apart.
pub async fn restore_playlist(client: &SpotifyClient, json_path: &Path) -> Result<Value> {
    let src: Value = serde_json::from_str(&std::fs::read_to_string(json_path)?)?;

    let src_name = src["name"]
        .as_str()
        .ok_or_else(|| Error::InvalidInput(format!("{}: not a playlist dump", json_path.display())))?;
    let description = src["description"].as_str().unwrap_or_default();

    let track_ids: Vec<String> = src["tracks"]["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["track"]["id"].as_str())
                .map(|id| id.to_string())
                .collect()
        })
        .unwrap_or_default();

    let name = format!("{} {}", Utc::now().format("Restore [%Y-%m-%d]"), src_name);
    info!("Copying playlist as {} ({} tracks)", name, track_ids.len());

    let dst = client.create_playlist(&name, description).await?;
    let dst_id = dst["id"]
        .as_str()
        .ok_or_else(|| Error::Api {
            status: 200,
            message: "Playlist create response contained no id".to_string(),
        })?
        .to_string();
    debug!("Destination playlist ID: {}", dst_id);

    client.add_items_to_playlist(&dst_id, &track_ids).await?;
    Ok(dst)
}

/// Export a queried history range as a new playlist; returns its web URL
pub async fn playlist_from_history(
    client: &SpotifyClient,
    name: &str,
    entries: &[HistoryEntry],
) -> Result<String> {
    let track_ids: Vec<String> = entries.iter().map(|e| e.track_id.clone()).collect();
    info!("Copying playlist as {} ({} tracks)", name, track_ids.len());

    let dst = client.create_playlist(name, "").await?;
    let dst_id = dst["id"]
        .as_str()
        .ok_or_else(|| Error::Api {
            status: 200,
            message: "Playlist create response contained no id".to_string(),
        })?
        .to_string();

    client.add_items_to_playlist(&dst_id, &track_ids).await?;
    Ok(dst["external_urls"]["spotify"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}
