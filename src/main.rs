//! spotify-backup - library backup and listening-history CLI

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use spotify_backup::api::SpotifyClient;
use spotify_backup::db::{history, tracks};
use spotify_backup::{backfill, backup, config, db, ingest, output, restore};

/// Command-line arguments for spotify-backup
#[derive(Parser, Debug)]
#[command(name = "spotify-backup")]
#[command(about = "Back up a Spotify library and track listening history")]
#[command(version)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Backup folder (also settable via SPOTIFY_BACKUP_DIR or config.toml)
    #[arg(long, global = true)]
    backup_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full backup: playlists, saved items, top items, followed
    /// artists and the play-history pull
    Backup,

    /// Pull new play events from the "recently played" feed into the
    /// history database. The feed only holds the last 50 plays, so run
    /// this often enough that no more than 50 plays happen in between
    BackfillHistory,

    /// List listening history, optionally bounded by a time window
    History {
        /// Start of the window (ISO date or datetime)
        #[arg(long, value_parser = parse_datetime)]
        start: Option<DateTime<Utc>>,
        /// End of the window, inclusive (ISO date or datetime)
        #[arg(long, value_parser = parse_datetime)]
        end: Option<DateTime<Utc>>,
        /// Also export the listed history as a new playlist with this name
        #[arg(long)]
        create_playlist: Option<String>,
    },

    /// Import listening history from bulk export (GDPR request) files
    ImportHistory {
        /// Export JSON files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Most-played tracks over a date window
    TopTracks {
        /// Start date (default: 30 days ago)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date, inclusive (default: today)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Number of tracks to show; 0 or less shows all
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Most-played tracks on this day N years ago
    TodayYearsAgo {
        /// How many years to look back
        #[arg(long, default_value_t = 1)]
        years: i32,
        /// Number of tracks to show; 0 or less shows all
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Recreate a playlist from a backup file
    RestorePlaylist {
        /// Playlist dump to restore
        file: PathBuf,
    },
}

/// Accept a bare date (midnight UTC), a naive datetime or a full RFC 3339
/// timestamp
fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = s.parse::<NaiveDate>() {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(format!("Not an ISO date or datetime: {s}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("Starting spotify-backup v{}", env!("CARGO_PKG_VERSION"));

    let backup_dir = config::resolve_backup_dir(cli.backup_dir.as_deref());
    info!("Backup folder: {}", backup_dir.display());

    // Schema migrations run on open; a failure aborts before any backup
    // work starts
    let pool = db::open_database(&config::history_db_path(&backup_dir)).await?;

    match cli.command {
        Command::Backup => {
            let client = SpotifyClient::connect().await?;
            backup::run_full_backup(&pool, &client, &backup_dir).await?;
        }

        Command::BackfillHistory => {
            let client = SpotifyClient::connect().await?;
            let added = backup::backfill_history(&pool, &client).await?;
            println!("Added {added} history items");
        }

        Command::History {
            start,
            end,
            create_playlist,
        } => {
            let entries = history::get_history(&pool, start, end, -1).await?;
            if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
                println!(
                    "Listening history from {} to {}, {} items:",
                    first.played_at_utc().format("%Y-%m-%d %H:%M:%S"),
                    last.played_at_utc().format("%Y-%m-%d %H:%M:%S"),
                    entries.len()
                );
            }
            if let Some(name) = create_playlist {
                let client = SpotifyClient::connect().await?;
                let url = restore::playlist_from_history(&client, &name, &entries).await?;
                println!("Playlist created with {} tracks: {}", entries.len(), url);
            }
            print!("{}", output::history_table(&entries));
        }

        Command::ImportHistory { files } => {
            for file in &files {
                ingest::import_export_file(&pool, file).await?;
            }
            // Only go through authorization when there is metadata to fetch
            if tracks::fetch_missing(&pool, 1).await?.is_empty() {
                info!("No tracks missing metadata; skipping backfill");
            } else {
                info!("Backfilling missing track data");
                let client = SpotifyClient::connect().await?;
                backfill::backfill_track_data(&pool, &client).await?;
            }
        }

        Command::TopTracks { start, end, limit } => {
            let today = Utc::now().date_naive();
            let start = start.unwrap_or(today - Duration::days(30));
            let end = end.unwrap_or(today);

            let top = history::get_top_tracks(&pool, start, end, limit).await?;
            println!(
                "Top {}tracks from {} to {}:",
                limit_prefix(limit),
                start,
                end
            );
            print!("{}", output::top_tracks_table(&top));
        }

        Command::TodayYearsAgo { years, limit } => {
            let top = history::get_today_years_ago(&pool, years, limit).await?;
            println!(
                "Top {}tracks from today {} year(s) ago:",
                limit_prefix(limit),
                years
            );
            print!("{}", output::top_tracks_table(&top));
        }

        Command::RestorePlaylist { file } => {
            let client = SpotifyClient::connect().await?;
            let dst = restore::restore_playlist(&client, &file).await?;
            println!(
                "Playlist restored: {}",
                dst["external_urls"]["spotify"].as_str().unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn limit_prefix(limit: i64) -> String {
    if limit > 0 {
        format!("{limit} ")
    } else {
        String::new()
    }
}
