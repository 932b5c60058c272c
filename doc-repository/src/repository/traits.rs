//! Record capability trait and result shapes
//!
//! A type becomes manageable by
//! [`GenericRepository`](super::GenericRepository) by implementing
//! [`ManagedRecord`]. The trait names the collection and the record's
//! capability set (identity field, soft-delete marker, timestamps) and
//! offers validation hooks run before writes.
//!
//! # Example
//!
//! ```rust
//! use doc_repository::repository::{ManagedRecord, RepositoryError, RepositoryResult};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Note {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<String>,
//!     title: String,
//!     #[serde(default)]
//!     is_deleted: bool,
//! }
//!
//! impl ManagedRecord for Note {
//!     const COLLECTION: &'static str = "notes";
//!     const ENTITY_NAME: &'static str = "Note";
//!
//!     fn validate(&self) -> RepositoryResult<()> {
//!         if self.title.trim().is_empty() {
//!             return Err(RepositoryError::validation_failed("title is required"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use crate::store::{Document, Update};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// An entity stored in a collection managed by the repository
///
/// Records are converted to and from documents with `serde`. Fields the
/// repository maintains (`isDeleted`, `createdAt`, `updatedAt`) should be
/// optional or `#[serde(default)]` on the record type, since listings strip
/// the soft-delete marker before hydration.
pub trait ManagedRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection holding the records
    const COLLECTION: &'static str;

    /// Entity name used in error context, e.g. `Note`
    const ENTITY_NAME: &'static str;

    /// Identity field
    const ID_FIELD: &'static str = crate::store::ID_FIELD;

    /// Boolean soft-delete marker
    const SOFT_DELETE_FIELD: &'static str = "isDeleted";

    /// Whether `createdAt` / `updatedAt` are maintained
    const TIMESTAMPS: bool = true;

    /// Check a record before it is inserted
    fn validate(&self) -> RepositoryResult<()> {
        Ok(())
    }

    /// Check an update before it is applied
    fn validate_update(update: &Update) -> RepositoryResult<()> {
        let _ = update;
        Ok(())
    }
}

/// A single payload or a batch; results mirror the input arity
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    /// Exactly one item
    One(T),
    /// Zero or more items
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flatten into a vector
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    /// True for an empty batch
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert every item, keeping the arity
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            Self::One(item) => OneOrMany::One(f(item)),
            Self::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }

    /// The single item, if this is `One`
    pub fn one(self) -> Option<T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(_) => None,
        }
    }
}

/// A record returned by a read or write
///
/// `Lean` carries the raw stored document; `Hydrated` the deserialized
/// record type.
#[derive(Debug, Clone, PartialEq)]
pub enum Record<T> {
    /// Plain document
    Lean(Document),
    /// Typed record
    Hydrated(T),
}

impl<T: ManagedRecord> Record<T> {
    /// Build a record from a stored document
    pub(crate) fn from_document(
        doc: Document,
        lean: bool,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self> {
        if lean {
            return Ok(Self::Lean(doc));
        }
        serde_json::from_value(Value::Object(doc))
            .map(Self::Hydrated)
            .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))
    }

    /// Whether this is a plain document
    pub fn is_lean(&self) -> bool {
        matches!(self, Self::Lean(_))
    }

    /// Borrow the typed record, if hydrated
    pub fn as_record(&self) -> Option<&T> {
        match self {
            Self::Hydrated(record) => Some(record),
            Self::Lean(_) => None,
        }
    }

    /// Borrow the document, if lean
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Lean(doc) => Some(doc),
            Self::Hydrated(_) => None,
        }
    }

    /// The typed record, deserializing a lean document when needed
    pub fn into_inner(self) -> RepositoryResult<T> {
        match self {
            Self::Hydrated(record) => Ok(record),
            Self::Lean(doc) => serde_json::from_value(Value::Object(doc)).map_err(|e| {
                RepositoryError::serialization_error(RepositoryOperation::Find, e.to_string())
            }),
        }
    }

    /// The document form, serializing a typed record when needed
    pub fn into_document(self) -> RepositoryResult<Document> {
        match self {
            Self::Lean(doc) => Ok(doc),
            Self::Hydrated(record) => to_document(&record, RepositoryOperation::Find),
        }
    }

    /// Value of a top-level field
    pub fn get(&self, field: &str) -> Option<Value> {
        match self {
            Self::Lean(doc) => doc.get(field).cloned(),
            Self::Hydrated(record) => match serde_json::to_value(record) {
                Ok(Value::Object(mut map)) => map.remove(field),
                _ => None,
            },
        }
    }

    /// Identity as a string
    pub fn id(&self) -> Option<String> {
        self.get(T::ID_FIELD).map(|id| match id {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

impl<T: Serialize> Serialize for Record<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Lean(doc) => doc.serialize(serializer),
            Self::Hydrated(record) => record.serialize(serializer),
        }
    }
}

/// Serialize a record into a document
pub(crate) fn to_document<T: Serialize>(
    record: &T,
    operation: RepositoryOperation,
) -> RepositoryResult<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(RepositoryError::serialization_error(
            operation,
            format!("record must serialize to an object, got {other}"),
        )),
        Err(e) => Err(RepositoryError::serialization_error(operation, e.to_string())),
    }
}
