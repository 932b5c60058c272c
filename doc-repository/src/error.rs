//! Crate-level error type

use thiserror::Error;

use crate::query::QueryError;
use crate::repository::RepositoryError;
use crate::store::StoreError;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced outside the repository layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Structured repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Document store error outside a repository call
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Filter or sort decoding error outside a repository call
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, RepositoryOperation};

    #[test]
    fn test_repository_error_passes_through_display() {
        let error: Error = RepositoryError::not_found("Note", "n1").into();
        assert_eq!(
            error.to_string(),
            "Repository not_found error during find_by_id: Entity not found [Note: n1]"
        );
        assert!(matches!(
            error,
            Error::Repository(RepositoryError { kind: RepositoryErrorKind::NotFound, operation: RepositoryOperation::FindById, .. })
        ));
    }

    #[test]
    fn test_query_error_wrapped() {
        let error: Error = QueryError::BadSortFormat("empty sort token".into()).into();
        assert!(error.to_string().starts_with("Query error: "));
    }
}
