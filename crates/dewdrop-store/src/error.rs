//! Error types for dewdrop-store.

use std::path::PathBuf;

/// Result type for dewdrop-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dewdrop-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored timestamp is out of range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// A stored row could not be decoded.
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}
