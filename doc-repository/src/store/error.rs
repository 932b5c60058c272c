//! Errors reported by document store backends

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`DocumentStore`](super::DocumentStore)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("duplicate key in '{collection}' on index '{index}': {key}")]
    DuplicateKey {
        /// Collection written to
        collection: String,
        /// Name of the violated index
        index: String,
        /// Rendered key value
        key: String,
    },

    /// The operation exceeded its execution-time ceiling
    #[error("operation exceeded time limit of {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A transaction observed a concurrent write to a collection it touched
    #[error("write conflict on '{0}'; transaction aborted")]
    WriteConflict(String),

    /// The session handle is unknown or already ended
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Misuse of transaction lifecycle (e.g. commit without start)
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The hint names an index that does not exist
    #[error("hint does not correspond to an existing index: {0}")]
    BadHint(String),

    /// The request is malformed for this backend
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The backend is unreachable
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::WriteConflict(_) | Self::Connection(_)
        )
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
