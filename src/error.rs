//! Error types for the movie-insight crate.

use std::fmt;

/// Errors returned by movie store operations.
///
/// These are never caught inside the crate; they propagate to the caller.
#[derive(Debug)]
pub enum StoreError {
    /// Error from the SQLite engine (missing file, missing table, bad SQL).
    Database(rusqlite::Error),
    /// A row could not be mapped to a record.
    MalformedRow(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(err) => write!(f, "Database error: {err}"),
            Self::MalformedRow(msg) => write!(f, "Malformed row: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(err) => Some(err),
            Self::MalformedRow(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}
