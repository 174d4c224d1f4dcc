//! Store error types.

use thiserror::Error;

/// Result type alias using the store's error type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the ledger store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure (fatal at startup).
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A row expected to exist was not found.
    #[error("{0} not found")]
    NotFound(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::NotFound("conversation");
        assert_eq!(err.to_string(), "conversation not found");
    }

    #[test]
    fn test_database_error_display() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(err.to_string().contains("database error"));
    }
}
