//! Generic soft-delete aware repository over a [`DocumentStore`](crate::store::DocumentStore)
//!
//! # Features
//!
//! - **Uniform CRUD**: [`GenericRepository`] gives every [`ManagedRecord`] type
//!   the same create, read, update, delete and count surface
//! - **Soft delete**: default-path calls never see records whose marker is `true`
//! - **Listing**: [`get_all_data`](GenericRepository::get_all_data) decodes
//!   filter and sort strings and returns a [`Page`] with pagination metadata
//! - **Relation expansion**: [`Populate`] swaps references for referenced records
//! - **Transactions**: [`with_transaction`](GenericRepository::with_transaction)
//!   commits on success and aborts on error or panic
//!
//! # Example
//!
//! ```rust,ignore
//! use doc_repository::repository::{GenericRepository, GetAllParams, ManagedRecord};
//! use doc_repository::store::InMemoryStore;
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<String>,
//!     name: String,
//! }
//!
//! impl ManagedRecord for User {
//!     const COLLECTION: &'static str = "users";
//!     const ENTITY_NAME: &'static str = "User";
//! }
//!
//! let users: GenericRepository<User, _> = GenericRepository::new(InMemoryStore::new());
//! let page = users
//!     .get_all_data(GetAllParams::new().filter(r#"{"and":{"name__startsWith":"al"}}"#).page("2").length("25"))
//!     .await?;
//! println!("{} users", page.pagination.total_items);
//! ```

mod error;
mod generic;
mod listing;
mod options;
mod pagination;
mod populate;
mod scope;
mod traits;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use generic::{GenericRepository, CREATED_AT, UPDATED_AT};
pub use listing::{
    FacetAggregation, GetAllParams, ListingMode, ListingPlan, ListingStrategy, Page, SimpleQuery,
};
pub use options::{
    AggregateOptions, CountOptions, CreateOptions, DeleteOptions, FindByIdParams, FindOneParams,
    FindParams, QueryOptions, UpdateOptions,
};
pub use pagination::{
    query_to_pagination, result_to_pagination, PaginationRequest, PaginationResult,
    DEFAULT_PAGE_SIZE,
};
pub use populate::Populate;
pub use scope::SoftDeleteScope;
pub use traits::{ManagedRecord, OneOrMany, Record, RepositoryResult};
