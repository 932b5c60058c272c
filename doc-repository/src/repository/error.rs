//! Repository error types
//!
//! Every failure surfaced by [`GenericRepository`](super::GenericRepository)
//! is a [`RepositoryError`] carrying the operation that failed, a category
//! and, where known, the entity involved. Query decoding failures and store
//! failures are folded into the same shape with their category preserved.
//!
//! # Example
//!
//! ```rust
//! use doc_repository::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("Note", "n_123").with_operation(RepositoryOperation::SoftDelete);
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(
//!     error.to_string(),
//!     "Repository not_found error during soft_delete: Entity not found [Note: n_123]"
//! );
//! ```

use std::fmt;

use crate::query::QueryError;
use crate::store::StoreError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single record by identity
    FindById,
    /// Filtered read of many records
    Find,
    /// Filtered read of one record
    FindOne,
    /// Counting records
    Count,
    /// Checking for existence
    Exists,
    /// Inserting records
    Create,
    /// Updating one record
    Update,
    /// Updating many records
    UpdateMany,
    /// Physically deleting one record
    Delete,
    /// Physically deleting many records
    DeleteMany,
    /// Marking records deleted
    SoftDelete,
    /// Clearing the deleted marker
    Restore,
    /// Lookup-then-insert
    FindOrCreate,
    /// Running a caller pipeline
    Aggregate,
    /// Paginated listing
    GetAllData,
    /// Session and transaction handling
    Transaction,
    /// Batch loading related records
    BatchLoad,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FindById => "find_by_id",
            Self::Find => "find",
            Self::FindOne => "find_one",
            Self::Count => "count",
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateMany => "update_many",
            Self::Delete => "delete",
            Self::DeleteMany => "delete_many",
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
            Self::FindOrCreate => "find_or_create",
            Self::Aggregate => "aggregate",
            Self::GetAllData => "get_all_data",
            Self::Transaction => "transaction",
            Self::BatchLoad => "batch_load",
        };
        f.write_str(name)
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Filter string could not be decoded
    InvalidFilterFormat,
    /// Filter references fields outside the allow-list
    NonFilterableField,
    /// Sort string could not be decoded
    BadSortFormat,
    /// No non-deleted record matched
    NotFound,
    /// A uniqueness constraint rejected the write
    AlreadyExists,
    /// Record validation failed before the write
    ValidationFailed,
    /// Store unreachable
    ConnectionFailed,
    /// Execution-time ceiling exceeded
    Timeout,
    /// Transaction aborted by a concurrent write
    TransactionConflict,
    /// Any other store failure
    DatabaseError,
    /// Record (de)serialization failed
    SerializationError,
    /// Unclassified
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidFilterFormat => "invalid_filter_format",
            Self::NonFilterableField => "non_filterable_field",
            Self::BadSortFormat => "bad_sort_format",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::ValidationFailed => "validation_failed",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::TransactionConflict => "transaction_conflict",
            Self::DatabaseError => "database_error",
            Self::SerializationError => "serialization_error",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "Note")
    pub entity_type: Option<String>,
    /// The identity of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// No non-deleted record with this identity
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Record validation rejected the payload
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Record could not be converted to or from a document
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Map a store failure, keeping its category
    pub fn from_store(operation: RepositoryOperation, error: StoreError) -> Self {
        let kind = match &error {
            StoreError::DuplicateKey { .. } => RepositoryErrorKind::AlreadyExists,
            StoreError::Timeout(_) => RepositoryErrorKind::Timeout,
            StoreError::WriteConflict(_) => RepositoryErrorKind::TransactionConflict,
            StoreError::Connection(_) => RepositoryErrorKind::ConnectionFailed,
            StoreError::SessionNotFound(_)
            | StoreError::Transaction(_)
            | StoreError::BadHint(_)
            | StoreError::InvalidOperation(_)
            | StoreError::Backend(_) => RepositoryErrorKind::DatabaseError,
        };
        Self::new(operation, kind, error.to_string())
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether the caller's input was at fault (decode or allow-list failures)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::InvalidFilterFormat
                | RepositoryErrorKind::NonFilterableField
                | RepositoryErrorKind::BadSortFormat
                | RepositoryErrorKind::ValidationFailed
        )
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// The repository itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed
                | RepositoryErrorKind::Timeout
                | RepositoryErrorKind::TransactionConflict
        )
    }
}

impl From<QueryError> for RepositoryError {
    fn from(error: QueryError) -> Self {
        let kind = match &error {
            QueryError::InvalidFilterFormat(_) => RepositoryErrorKind::InvalidFilterFormat,
            QueryError::NonFilterableField { .. } => RepositoryErrorKind::NonFilterableField,
            QueryError::BadSortFormat(_) => RepositoryErrorKind::BadSortFormat,
        };
        Self::new(RepositoryOperation::GetAllData, kind, error.to_string())
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{entity_type}: {entity_id}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}
