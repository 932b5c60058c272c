//! # doc-repository
//!
//! Soft-delete aware generic repository for document stores.
//!
//! ## Features
//!
//! - **Filter DSL**: string filters with `and`/`or`/`not` groups and `field__op` keys
//! - **Sort decoding**: `-createdAt`, `name:asc`, `{"age":-1}` and friends
//! - **Soft delete**: records flagged `isDeleted` vanish from default reads and writes
//! - **Listing**: paginated `get_all_data` with field allow-lists and two strategies
//! - **Store abstraction**: [`DocumentStore`](store::DocumentStore) with an in-memory backend
//! - **Configuration**: Figment layering of defaults, TOML files and `DOCREPO_` env vars
//!
//! ## Example
//!
//! ```rust,ignore
//! use doc_repository::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let notes: GenericRepository<Note, _> =
//!         GenericRepository::with_config(InMemoryStore::new(), config.repository.clone());
//!
//!     let page = notes
//!         .get_all_data(
//!             GetAllParams::new()
//!                 .filter(r#"{"and":{"status":"published"}}"#)
//!                 .sort("-createdAt")
//!                 .page("1")
//!                 .length("20"),
//!         )
//!         .await?;
//!     println!("{} of {}", page.data.len(), page.pagination.total_items);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod query;
pub mod repository;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, RepositoryConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;

    pub use crate::query::{decode_sort, parse_filter, Filter, FilterValue, SortKey, SortSpec};

    pub use crate::repository::{
        AggregateOptions, CountOptions, CreateOptions, DeleteOptions, FindByIdParams,
        FindOneParams, FindParams, GenericRepository, GetAllParams, ListingMode, ManagedRecord,
        OneOrMany, Page, PaginationResult, Populate, QueryOptions, Record, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryResult, SoftDeleteScope,
        UpdateOptions,
    };

    pub use crate::store::{
        Collation, Document, DocumentStore, IndexHint, IndexSpec, Projection, ReadConcern,
        ReadPreference, Session, Stage, StoreOptions, Update,
    };

    #[cfg(feature = "memory-store")]
    pub use crate::store::InMemoryStore;

    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};
}
