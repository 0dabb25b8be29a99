//! Common error types for spotify-backup

use thiserror::Error;

/// Common result type for spotify-backup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared across the library
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse or serialize error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the Spotify Web API
    #[error("Spotify API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Authorization or token-cache error
    #[error("Auth error: {0}")]
    Auth(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this is a SQLite foreign-key constraint violation.
    ///
    /// The ingestion engine uses this to drive its create-then-retry path:
    /// a history insert referencing an unknown track fails with this kind,
    /// the track row is created, and the insert is retried.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.kind(), sqlx::error::ErrorKind::ForeignKeyViolation)
            }
            _ => false,
        }
    }
}
