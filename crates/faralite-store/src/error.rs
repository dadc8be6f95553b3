//! Store error type.

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `SQLite` failure.
    #[error("database error: {0}")]
    Database(String),

    /// Row not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (e.g. duplicate card number).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input rejected before reaching the database.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(e.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(e.to_string()),
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
