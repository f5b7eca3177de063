use rusqlite::ErrorCode;

/// Store failures surfaced to the monitoring core.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with the same unique key already exists (duplicate base_url race).
    #[error("conflicting row already exists")]
    Conflict,
    /// Anything else at the sqlite level. Not retried by callers.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Unavailable(e),
        }
    }
}
