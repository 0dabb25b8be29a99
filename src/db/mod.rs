//! Listening-history database: schema, migrations and access

pub mod history;
pub mod init;
pub mod migrations;
pub mod models;
pub mod tracks;

pub use history::InsertOutcome;
pub use init::open_database;
pub use models::{HistoryEntry, TopTrack};
