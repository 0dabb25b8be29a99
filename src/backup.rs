//! Full backup orchestration
//!
//! A backup run is a series of named sub-tasks (playlists, saved items,
//! top items, followed artists, play history). Each sub-task fails
//! independently: a playlist-fetch error is logged and the run moves on,
//! so a single flaky endpoint never blocks the history pull.

use crate::api::model::{SavedKind, TimeRange, TopKind};
use crate::api::SpotifyClient;
use crate::db::history;
use crate::{ingest, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Run every backup sub-task, logging per-task outcomes
pub async fn run_full_backup(
    pool: &SqlitePool,
    client: &SpotifyClient,
    backup_dir: &Path,
) -> Result<()> {
    log_outcome("playlists", backup_playlists(client, backup_dir).await);
    log_outcome("saved items", backup_saved_items(client, backup_dir).await);
    log_outcome("top items", backup_top_items(client, backup_dir).await);
    log_outcome(
        "followed artists",
        backup_followed_artists(client, backup_dir).await,
    );
    log_outcome("play history", backfill_history(pool, client).await.map(|_| ()));
    Ok(())
}

fn log_outcome(task: &str, result: Result<()>) {
    match result {
        Ok(()) => info!("✓ Backed up {}", task),
        Err(e) => error!("Backup sub-task '{}' failed: {}", task, e),
    }
}

/// Pull new play events from the live feed into the ledger.
///
/// The watermark is the ledger's most recent timestamp; the feed's `after`
/// filter is unreliable upstream, so deduplication rests entirely on the
/// ledger's insert-or-ignore semantics. The feed only ever holds the last
/// 50 plays - runs must be scheduled often enough that no more than 50
/// plays happen in between, or the gap is silently lost.
pub async fn backfill_history(pool: &SqlitePool, client: &SpotifyClient) -> Result<u64> {
    let watermark = history::most_recent_timestamp(pool).await?;
    // The API expects the cursor in milliseconds
    let items = client.recently_played(Some(watermark * 1000)).await?;
    info!("Fetched {} play events from the live feed", items.len());
    ingest::insert_play_history(pool, &items, Some(watermark)).await
}

/// Dump every playlist, split into own (`playlists/my/`) and followed
/// (`playlists/starred/`) by owner
async fn backup_playlists(client: &SpotifyClient, backup_dir: &Path) -> Result<()> {
    let playlists = client.current_user_playlists().await?;
    info!("Backing up {} playlists", playlists.len());

    for playlist in playlists {
        let Some(id) = playlist["id"].as_str() else {
            continue;
        };
        let owned = playlist["owner"]["id"].as_str() == Some(client.user_id());
        let subdir = if owned { "my" } else { "starred" };

        let full = client.playlist(id).await?;
        let path = backup_path(backup_dir, &["playlists", subdir], &format!("{id}.json"))?;
        dump_json(&path, &full)?;
    }
    Ok(())
}

/// Dump each saved-item category to `saved/<kind>.json`
async fn backup_saved_items(client: &SpotifyClient, backup_dir: &Path) -> Result<()> {
    for kind in SavedKind::ALL {
        let items = client.saved_items(kind).await?;
        info!("Backing up {} saved {}", items.len(), kind.as_str());
        let path = backup_path(backup_dir, &["saved"], &format!("{}.json", kind.as_str()))?;
        dump_json(&path, &Value::Array(items))?;
    }
    Ok(())
}

/// Dump each top-item category and time range to `top/<kind>_<range>.json`
async fn backup_top_items(client: &SpotifyClient, backup_dir: &Path) -> Result<()> {
    for kind in TopKind::ALL {
        for range in TimeRange::ALL {
            let items = client.top_items(kind, range).await?;
            let file = format!("{}_{}.json", kind.as_str(), range.as_str());
            let path = backup_path(backup_dir, &["top"], &file)?;
            dump_json(&path, &Value::Array(items))?;
        }
    }
    Ok(())
}

async fn backup_followed_artists(client: &SpotifyClient, backup_dir: &Path) -> Result<()> {
    let artists = client.followed_artists().await?;
    info!("Backing up {} followed artists", artists.len());
    let path = backup_path(backup_dir, &[], "followed_artists.json")?;
    dump_json(&path, &Value::Array(artists))?;
    Ok(())
}

/// Build `<backup_dir>/<subdirs...>/<file>`, creating directories as needed
fn backup_path(backup_dir: &Path, subdirs: &[&str], file: &str) -> Result<PathBuf> {
    let mut dir = backup_dir.to_path_buf();
    for sub in subdirs {
        dir.push(sub);
    }
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(file))
}

/// Pretty-printed JSON dump with sorted keys
fn dump_json(path: &Path, value: &Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_creates_directories() {
        let dir = tempdir().unwrap();
        let path = backup_path(dir.path(), &["playlists", "my"], "abc.json").unwrap();

        assert!(path.parent().unwrap().is_dir());
        assert!(path.ends_with("playlists/my/abc.json"));
    }

    #[test]
    fn test_dump_json_sorts_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");

        let value: Value =
            serde_json::from_str(r#"{"zebra": 1, "apple": {"nested_z": 1, "nested_a": 2}}"#)
                .unwrap();
        dump_json(&path, &value).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.find("apple").unwrap() < written.find("zebra").unwrap());
        assert!(written.find("nested_a").unwrap() < written.find("nested_z").unwrap());
    }
}
