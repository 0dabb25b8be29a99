//! Configuration loading and backup folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Environment variable overriding the backup folder location
pub const BACKUP_DIR_ENV: &str = "SPOTIFY_BACKUP_DIR";

/// File name of the history database inside the backup folder
pub const HISTORY_DB_FILE: &str = "history.sqlite";

/// Backup folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. SPOTIFY_BACKUP_DIR environment variable
/// 3. `backup_dir` key in the TOML config file
/// 4. OS-dependent default under the local data directory (fallback)
pub fn resolve_backup_dir(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(BACKUP_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = config_file_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(backup_dir) = config.get("backup_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(backup_dir);
                }
            }
        }
    }

    // Priority 4: OS-dependent default
    default_backup_dir()
}

/// Path of the history database inside the backup folder
pub fn history_db_path(backup_dir: &std::path::Path) -> PathBuf {
    backup_dir.join(HISTORY_DB_FILE)
}

/// Path of the OAuth token cache file, under the platform config directory
/// (`$XDG_CONFIG_HOME/spotify-backup/token.json` on Linux)
pub fn token_cache_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    Ok(config_dir.join("spotify-backup").join("token.json"))
}

/// Config file location: `<config dir>/spotify-backup/config.toml`
fn config_file_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    let path = config_dir.join("spotify-backup").join("config.toml");
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Default backup folder under the platform's local data directory
fn default_backup_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("spotify-backup"))
        .unwrap_or_else(|| PathBuf::from("./spotify-backup"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_takes_priority() {
        let dir = resolve_backup_dir(Some("/tmp/my-backup"));
        assert_eq!(dir, PathBuf::from("/tmp/my-backup"));
    }

    #[test]
    fn test_default_is_not_empty() {
        let dir = default_backup_dir();
        assert!(!dir.as_os_str().is_empty());
    }

    #[test]
    fn test_history_db_path_appends_file_name() {
        let path = history_db_path(std::path::Path::new("/data/backup"));
        assert_eq!(path, PathBuf::from("/data/backup/history.sqlite"));
    }
}
