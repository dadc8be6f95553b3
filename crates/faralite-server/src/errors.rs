//! Server error types.

use thiserror::Error;

/// Errors from starting or running the ingestion server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying cause.
        source: std::io::Error,
    },
    /// Other socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
