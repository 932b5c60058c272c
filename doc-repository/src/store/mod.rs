//! Document store abstraction
//!
//! The repository layer talks to storage only through [`DocumentStore`].
//! Documents are JSON objects; filters arrive as compiled
//! [`Filter`](crate::query::Filter) trees and pipelines as [`Stage`] lists.
//!
//! Traits use RPITIT (Return Position Impl Trait In Traits), so backends
//! implement them with plain `async fn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use doc_repository::store::{DocumentStore, FindSpec, InMemoryStore, StoreOptions};
//! use doc_repository::query::Filter;
//!
//! let store = InMemoryStore::new();
//! let spec = FindSpec { filter: Filter::eq("status", "active"), ..FindSpec::default() };
//! let docs = store.find("users", &spec, &StoreOptions::default()).await?;
//! ```

mod error;
mod eval;
#[cfg(feature = "memory-store")]
mod memory;
mod path;
mod pipeline;
mod types;

use std::future::Future;

pub use error::{StoreError, StoreResult};
#[cfg(feature = "memory-store")]
pub use memory::InMemoryStore;
pub use types::{
    Collation, CountSpec, DeleteOutcome, Document, FindAndModify, FindSpec, IndexHint, IndexSpec,
    Projection, ReadConcern, ReadPreference, ReturnDocument, Session, Stage, StoreOptions, Update,
    UpdateOutcome, ID_FIELD,
};

pub(crate) use path::{get as get_path, set as set_path};

use crate::query::{Filter, SortSpec};

/// Asynchronous access to collections of JSON documents
///
/// Every method takes the collection name and per-call [`StoreOptions`].
/// Implementations must enforce `options.max_time` and run the call inside
/// `options.session`'s transaction when one is active.
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert documents, assigning `_id` where missing; returns them as stored
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Documents matching `spec`
    fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Atomically update the first match (by `spec.sort`)
    fn find_one_and_update(
        &self,
        collection: &str,
        spec: &FindAndModify,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Update every match
    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<UpdateOutcome>> + Send;

    /// Atomically remove the first match (by `sort`)
    fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &SortSpec,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Remove every match
    fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<DeleteOutcome>> + Send;

    /// Number of matches after `skip`, capped at `limit`
    fn count(
        &self,
        collection: &str,
        spec: &CountSpec,
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Run an aggregation pipeline
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Stage],
        options: &StoreOptions,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Open a session
    fn start_session(&self) -> impl Future<Output = StoreResult<Session>> + Send;

    /// Begin a transaction on `session`
    fn start_transaction(&self, session: &Session) -> impl Future<Output = StoreResult<()>> + Send;

    /// Commit the active transaction
    fn commit_transaction(&self, session: &Session) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard the active transaction
    fn abort_transaction(&self, session: &Session) -> impl Future<Output = StoreResult<()>> + Send;

    /// Close the session, aborting any open transaction
    fn end_session(&self, session: &Session) -> impl Future<Output = StoreResult<()>> + Send;
}
