//! Common error types for the outcomes workspace

use thiserror::Error;

/// Common result type for outcome operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the outcomes crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A derived record changed underneath a read-compute-write cycle.
    /// The caller may retry the whole cycle.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether repeating the failed operation may succeed
    ///
    /// True for optimistic-concurrency conflicts and for SQLite
    /// `SQLITE_BUSY` / `SQLITE_LOCKED` contention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            #[cfg(feature = "sqlx")]
            Error::Database(sqlx::Error::Database(db_err)) => {
                let message = db_err.message();
                message.contains("database is locked") || message.contains("database is busy")
            }
            #[cfg(feature = "sqlx")]
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
