//! # spotify-backup
//!
//! Backs up a Spotify library (playlists, saved items, top items, followed
//! artists) to local JSON files and keeps a local SQLite listening-history
//! database fed from the "recently played" feed and bulk export files.
//! Playlists can be restored from backup.

pub mod api;
pub mod backfill;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod output;
pub mod restore;

pub use error::{Error, Result};
