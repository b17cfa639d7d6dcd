//! Error types for statement execution.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Execution errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A statement could not be built. Raised before any network I/O.
    #[error(transparent)]
    Core(#[from] oxide_pg_core::Error),

    /// Database error from sqlx, passed through unmodified.
    #[error("database error: {0}")]
    Server(#[from] sqlx::Error),

    /// A raw query exceeded its client-side timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// A statement in the same batch failed; carries the failure.
    #[error("batch failed: {0}")]
    BatchFault(Arc<Error>),

    /// A pending result was never produced because its batch was dropped
    /// without being run.
    #[error("batch was dropped before it ran")]
    Abandoned,

    /// The transport returned fewer result sets than statements sent.
    #[error("expected {expected} result set(s), received {received}")]
    MissingResult {
        /// Number of statements sent.
        expected: usize,
        /// Number of result sets received.
        received: usize,
    },

    /// Invalid connection configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the server error behind this error, looking through batch
    /// faults.
    #[must_use]
    pub fn as_server(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Server(e) => Some(e),
            Self::BatchFault(inner) => inner.as_server(),
            _ => None,
        }
    }

    /// Returns the SQLSTATE code of a server error, if any.
    #[must_use]
    pub fn sqlstate(&self) -> Option<String> {
        self.as_server()
            .and_then(sqlx::Error::as_database_error)
            .and_then(|e| e.code())
            .map(|code| code.into_owned())
    }
}

/// Result type alias for execution.
pub type Result<T> = std::result::Result<T, Error>;
