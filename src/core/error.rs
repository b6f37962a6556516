//! Error types for the core engine.
//!
//! The CLI layer wraps these in `anyhow`; inside `core` every fallible call
//! returns [`Result`] so callers can branch on the variant.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input, rejected before any store is touched.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The store stayed busy/locked through every retry attempt.
    #[error("store contention on {context} after {attempts} attempt(s): {source}")]
    Contention {
        context: String,
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be decoded back into a domain value.
    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True when the underlying SQLite error is a lock/busy condition.
    pub fn is_contention(&self) -> bool {
        match self {
            Error::Database(e) => is_busy(e),
            _ => false,
        }
    }
}

/// SQLITE_BUSY and SQLITE_LOCKED (including their extended codes).
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
