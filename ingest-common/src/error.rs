//! Common error types for the ingest services

use thiserror::Error;

/// Common result type for ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across ingest services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a stored column failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error means the backing store could not be reached or
    /// was too contended to answer, as opposed to a malformed row or request.
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            Error::Database(db_err) => match db_err {
                sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
                | sqlx::Error::Io(_)
                | sqlx::Error::Tls(_) => true,
                sqlx::Error::Database(e) => e.code().is_some_and(|code| is_unavailable_code(&code)),
                _ => false,
            },
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// SQLite result codes meaning "try again later": BUSY, LOCKED, IOERR, CANTOPEN.
/// Extended codes carry the primary code in the low byte.
fn is_unavailable_code(code: &str) -> bool {
    const SQLITE_BUSY: i64 = 5;
    const SQLITE_LOCKED: i64 = 6;
    const SQLITE_IOERR: i64 = 10;
    const SQLITE_CANTOPEN: i64 = 14;

    code.parse::<i64>().is_ok_and(|code| {
        matches!(
            code & 0xff,
            SQLITE_BUSY | SQLITE_LOCKED | SQLITE_IOERR | SQLITE_CANTOPEN
        )
    })
}
