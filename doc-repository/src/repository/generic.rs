//! Generic soft-delete aware repository
//!
//! [`GenericRepository`] binds a [`ManagedRecord`] type to a
//! [`DocumentStore`] and exposes the uniform CRUD surface. Every
//! default-path read, update, delete and count is restricted to records
//! whose soft-delete marker is not `true`.
//!
//! # Example
//!
//! ```rust,ignore
//! use doc_repository::prelude::*;
//!
//! let notes: GenericRepository<Note, InMemoryStore> = GenericRepository::new(InMemoryStore::new());
//!
//! let created = notes.create_one(note, CreateOptions::default()).await?;
//! let id = created.id().unwrap_or_default();
//!
//! notes.soft_delete_by_id(&id, UpdateOptions::default()).await?;
//! assert!(notes.find_by_id(&id, FindByIdParams::default()).await.is_err());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::options::{
    AggregateOptions, CountOptions, CreateOptions, DeleteOptions, FindByIdParams, FindOneParams,
    FindParams, QueryOptions, UpdateOptions,
};
use super::populate::populate_documents;
use super::scope::SoftDeleteScope;
use super::traits::{to_document, ManagedRecord, OneOrMany, Record, RepositoryResult};
use crate::config::RepositoryConfig;
use crate::query::{format_date, Filter, FilterValue, SortKey, SortSpec};
use crate::store::{
    CountSpec, DeleteOutcome, Document, DocumentStore, FindAndModify, FindSpec, ReturnDocument,
    Session, Stage, StoreError, StoreOptions, Update,
};

/// Creation timestamp field
pub const CREATED_AT: &str = "createdAt";
/// Last-update timestamp field
pub const UPDATED_AT: &str = "updatedAt";

/// Repository over one collection of `T` records stored in `S`
pub struct GenericRepository<T, S> {
    pub(super) store: Arc<S>,
    pub(super) settings: RepositoryConfig,
    pub(super) defaults: QueryOptions,
    _record: PhantomData<fn() -> T>,
}

impl<T, S> Clone for GenericRepository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
            defaults: self.defaults.clone(),
            _record: PhantomData,
        }
    }
}

impl<T, S> std::fmt::Debug for GenericRepository<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericRepository")
            .field("record", &std::any::type_name::<T>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn timestamp() -> Value {
    Value::String(format_date(&Utc::now()))
}

fn is_unset(doc: &Document, field: &str) -> bool {
    matches!(doc.get(field), None | Some(Value::Null))
}

fn store_error(operation: RepositoryOperation) -> impl FnOnce(StoreError) -> RepositoryError {
    move |error| RepositoryError::from_store(operation, error)
}

impl<T: ManagedRecord, S: DocumentStore> GenericRepository<T, S> {
    /// Repository with default settings
    pub fn new(store: S) -> Self {
        Self::with_config(store, RepositoryConfig::default())
    }

    /// Repository with explicit settings
    pub fn with_config(store: S, settings: RepositoryConfig) -> Self {
        Self::from_shared(Arc::new(store), settings)
    }

    /// Repository over a store shared with other repositories
    pub fn from_shared(store: Arc<S>, settings: RepositoryConfig) -> Self {
        let defaults = QueryOptions {
            lean: Some(settings.lean_by_default),
            max_time: settings.default_max_time(),
            ..QueryOptions::default()
        };
        Self {
            store,
            settings,
            defaults,
            _record: PhantomData,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Settings this repository was built with
    pub fn settings(&self) -> &RepositoryConfig {
        &self.settings
    }

    /// Current repository-wide query defaults
    pub fn default_options(&self) -> &QueryOptions {
        &self.defaults
    }

    /// Replace repository-wide defaults; fields left unset in `options` keep
    /// their current value
    pub fn set_default_options(&mut self, options: QueryOptions) {
        self.defaults = options.merged_with(&self.defaults);
    }

    pub(super) fn resolve_lean(&self, lean: Option<bool>) -> bool {
        lean.or(self.defaults.lean)
            .unwrap_or(self.settings.lean_by_default)
    }

    fn scoped(filter: Filter) -> Filter {
        SoftDeleteScope::ActiveOnly.apply(T::SOFT_DELETE_FIELD, filter)
    }

    fn id_filter(id: &str) -> Filter {
        Filter::eq(T::ID_FIELD, id)
    }

    fn not_found(id: &str, operation: RepositoryOperation) -> RepositoryError {
        RepositoryError::not_found(T::ENTITY_NAME, id).with_operation(operation)
    }

    fn records(
        docs: Vec<Document>,
        lean: bool,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<Record<T>>> {
        docs.into_iter()
            .map(|doc| Record::from_document(doc, lean, operation))
            .collect()
    }

    /// Serialize a new record and fill in repository-maintained fields
    fn prepare_insert(record: &T, now: &Value) -> RepositoryResult<Document> {
        let mut doc = to_document(record, RepositoryOperation::Create)?;
        if is_unset(&doc, T::ID_FIELD) {
            doc.insert(
                T::ID_FIELD.to_string(),
                Value::String(Uuid::now_v7().simple().to_string()),
            );
        }
        if is_unset(&doc, T::SOFT_DELETE_FIELD) {
            doc.insert(T::SOFT_DELETE_FIELD.to_string(), Value::Bool(false));
        }
        if T::TIMESTAMPS {
            for field in [CREATED_AT, UPDATED_AT] {
                if is_unset(&doc, field) {
                    doc.insert(field.to_string(), now.clone());
                }
            }
        }
        Ok(doc)
    }

    fn stamp_update(update: Update, upsert: bool) -> Update {
        let now = timestamp();
        let mut update = if T::TIMESTAMPS && !update.sets(UPDATED_AT) {
            update.set(UPDATED_AT, now.clone())
        } else {
            update
        };
        if upsert {
            // Fields an inserted document gets from create
            update = update
                .set_on_insert(T::ID_FIELD, Uuid::now_v7().simple().to_string())
                .set_on_insert(T::SOFT_DELETE_FIELD, false);
            if T::TIMESTAMPS {
                update = update.set_on_insert(CREATED_AT, now);
            }
        }
        update
    }

    /// Run a find and expand relations
    async fn fetch(
        &self,
        operation: RepositoryOperation,
        spec: FindSpec,
        options: &QueryOptions,
    ) -> RepositoryResult<Vec<Document>> {
        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %spec.filter.summary(),
            sort = %spec.sort,
            skip = spec.skip,
            limit = ?spec.limit,
            "finding records"
        );
        let store_options = options.store_options();
        let mut docs = self
            .store
            .find(T::COLLECTION, &spec, &store_options)
            .await
            .map_err(store_error(operation))?;
        if !options.populate.is_empty() {
            populate_documents(self.store.as_ref(), &mut docs, &options.populate, &store_options)
                .await
                .map_err(store_error(operation))?;
        }
        Ok(docs)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert one record or a batch; the result has the same arity
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when a record fails [`ManagedRecord::validate`],
    /// `AlreadyExists` when a unique index rejects the batch (nothing is
    /// inserted in that case).
    pub async fn create(
        &self,
        data: OneOrMany<T>,
        options: CreateOptions,
    ) -> RepositoryResult<OneOrMany<Record<T>>> {
        let operation = RepositoryOperation::Create;
        let single = matches!(data, OneOrMany::One(_));
        let records = data.into_vec();

        if options.validate_before_save {
            for record in &records {
                record.validate().map_err(|e| e.with_operation(operation))?;
            }
        }

        let now = timestamp();
        let docs = records
            .iter()
            .map(|record| Self::prepare_insert(record, &now))
            .collect::<RepositoryResult<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(OneOrMany::Many(Vec::new()));
        }

        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            count = docs.len(),
            "creating records"
        );

        let store_options = StoreOptions {
            session: options.session,
            max_time: self.defaults.max_time,
            ..StoreOptions::default()
        };
        let inserted = self
            .store
            .insert_many(T::COLLECTION, docs, &store_options)
            .await
            .map_err(store_error(operation))?;

        let mut created = Self::records(inserted, self.resolve_lean(options.lean), operation)?;
        if single {
            created.pop().map(OneOrMany::One).ok_or_else(|| {
                RepositoryError::new(
                    operation,
                    RepositoryErrorKind::DatabaseError,
                    "store returned no inserted document",
                )
            })
        } else {
            Ok(OneOrMany::Many(created))
        }
    }

    /// Insert a single record
    pub async fn create_one(&self, data: T, options: CreateOptions) -> RepositoryResult<Record<T>> {
        self.create(OneOrMany::One(data), options)
            .await?
            .into_vec()
            .pop()
            .ok_or_else(|| {
                RepositoryError::new(
                    RepositoryOperation::Create,
                    RepositoryErrorKind::DatabaseError,
                    "store returned no inserted document",
                )
            })
    }

    /// Insert a batch of records
    pub async fn create_many(
        &self,
        data: Vec<T>,
        options: CreateOptions,
    ) -> RepositoryResult<Vec<Record<T>>> {
        Ok(self.create(OneOrMany::Many(data), options).await?.into_vec())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Non-deleted record with identity `id`
    ///
    /// # Errors
    ///
    /// `NotFound` when no non-deleted record has this identity.
    pub async fn find_by_id(&self, id: &str, params: FindByIdParams) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::FindById;
        let options = params.merged_with(&self.defaults);
        let spec = FindSpec {
            filter: Self::scoped(Self::id_filter(id)),
            limit: Some(1),
            projection: options.projection.clone(),
            ..FindSpec::default()
        };
        let doc = self
            .fetch(operation, spec, &options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(id, operation))?;
        Record::from_document(doc, self.resolve_lean(options.lean), operation)
    }

    /// Records matching `params.filter` within `params.scope`
    pub async fn find(&self, params: FindParams) -> RepositoryResult<Vec<Record<T>>> {
        let operation = RepositoryOperation::Find;
        let FindParams {
            filter,
            sort,
            skip,
            limit,
            batch_size,
            scope,
            options,
        } = params;
        let options = options.merged_with(&self.defaults);
        let spec = FindSpec {
            filter: scope.apply(T::SOFT_DELETE_FIELD, filter),
            sort,
            skip,
            limit: limit.filter(|l| *l > 0),
            projection: options.projection.clone(),
            batch_size,
        };
        let docs = self.fetch(operation, spec, &options).await?;
        Self::records(docs, self.resolve_lean(options.lean), operation)
    }

    async fn find_first(
        &self,
        params: FindOneParams,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Option<Record<T>>> {
        let options = params.options.merged_with(&self.defaults);
        let spec = FindSpec {
            filter: params.scope.apply(T::SOFT_DELETE_FIELD, params.filter),
            sort: params.sort,
            limit: Some(1),
            projection: options.projection.clone(),
            ..FindSpec::default()
        };
        let lean = self.resolve_lean(options.lean);
        self.fetch(operation, spec, &options)
            .await?
            .into_iter()
            .next()
            .map(|doc| Record::from_document(doc, lean, operation))
            .transpose()
    }

    /// First record matching `params.filter` (by `params.sort`)
    pub async fn find_one(&self, params: FindOneParams) -> RepositoryResult<Option<Record<T>>> {
        self.find_first(params, RepositoryOperation::FindOne).await
    }

    /// Most recently created record matching `params.filter`
    ///
    /// Caller sort keys break ties after `createdAt` descending.
    pub async fn find_latest(&self, mut params: FindOneParams) -> RepositoryResult<Option<Record<T>>> {
        let mut keys = vec![SortKey::desc(CREATED_AT)];
        keys.extend(params.sort.0.into_iter().filter(|k| k.field != CREATED_AT));
        params.sort = SortSpec(keys);
        self.find_first(params, RepositoryOperation::FindOne).await
    }

    /// Non-deleted records keyed by identity, loaded with one query
    pub async fn batch_load(
        &self,
        ids: &[String],
        options: QueryOptions,
    ) -> RepositoryResult<HashMap<String, Record<T>>> {
        let operation = RepositoryOperation::BatchLoad;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let options = options.merged_with(&self.defaults);
        let values = ids.iter().map(|id| FilterValue::from(id.as_str())).collect();
        let spec = FindSpec {
            filter: Self::scoped(Filter::is_in(T::ID_FIELD, values)),
            projection: options.projection.clone(),
            ..FindSpec::default()
        };
        let lean = self.resolve_lean(options.lean);
        let mut loaded = HashMap::with_capacity(ids.len());
        for doc in self.fetch(operation, spec, &options).await? {
            let key = match doc.get(T::ID_FIELD) {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            loaded.insert(key, Record::from_document(doc, lean, operation)?);
        }
        Ok(loaded)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    async fn modify_one(
        &self,
        operation: RepositoryOperation,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Option<Record<T>>> {
        if options.run_validators {
            T::validate_update(&update).map_err(|e| e.with_operation(operation))?;
        }

        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %filter.summary(),
            upsert = options.upsert,
            "updating record"
        );

        let spec = FindAndModify {
            filter,
            sort: options.sort,
            update: Self::stamp_update(update, options.upsert),
            upsert: options.upsert,
            return_document: if options.return_new {
                ReturnDocument::After
            } else {
                ReturnDocument::Before
            },
            projection: options.projection,
        };
        let store_options = StoreOptions {
            session: options.session,
            max_time: options.max_time.or(self.defaults.max_time),
            hint: options.hint,
            ..StoreOptions::default()
        };
        let lean = self.resolve_lean(options.lean);
        self.store
            .find_one_and_update(T::COLLECTION, &spec, &store_options)
            .await
            .map_err(store_error(operation))?
            .map(|doc| Record::from_document(doc, lean, operation))
            .transpose()
    }

    async fn modify_many(
        &self,
        operation: RepositoryOperation,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Vec<Record<T>>> {
        if options.run_validators {
            T::validate_update(&update).map_err(|e| e.with_operation(operation))?;
        }

        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %filter.summary(),
            "updating records"
        );

        let store_options = StoreOptions {
            session: options.session,
            max_time: options.max_time.or(self.defaults.max_time),
            hint: options.hint,
            ..StoreOptions::default()
        };
        let outcome = self
            .store
            .update_many(T::COLLECTION, &filter, &Self::stamp_update(update, false), &store_options)
            .await
            .map_err(store_error(operation))?;
        if outcome.affected_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Re-read by identity; the write may have moved records out of the filter.
        let ids = outcome.affected_ids.into_iter().map(FilterValue::from).collect();
        let spec = FindSpec {
            filter: Filter::is_in(crate::store::ID_FIELD, ids),
            projection: options.projection,
            ..FindSpec::default()
        };
        let refetch_options = StoreOptions {
            hint: None,
            ..store_options
        };
        let docs = self
            .store
            .find(T::COLLECTION, &spec, &refetch_options)
            .await
            .map_err(store_error(operation))?;
        Self::records(docs, self.resolve_lean(options.lean), operation)
    }

    /// Update the non-deleted record with identity `id`
    ///
    /// # Errors
    ///
    /// `NotFound` when no non-deleted record has this identity (and
    /// `upsert` is off).
    pub async fn update_by_id(
        &self,
        id: &str,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::Update;
        self.modify_one(operation, Self::scoped(Self::id_filter(id)), update, options)
            .await?
            .ok_or_else(|| Self::not_found(id, operation))
    }

    /// Update the first non-deleted record matching `filter`
    pub async fn update_one(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Option<Record<T>>> {
        self.find_one_and_update(filter, update, options).await
    }

    /// Atomically update the first non-deleted match (by `options.sort`)
    ///
    /// Returns the post-update record unless `options.return_new` is off.
    pub async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Option<Record<T>>> {
        self.modify_one(RepositoryOperation::Update, Self::scoped(filter), update, options)
            .await
    }

    /// Update every non-deleted match, then read the affected records back
    ///
    /// The write and the read are separate store calls.
    pub async fn update_many(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> RepositoryResult<Vec<Record<T>>> {
        self.modify_many(RepositoryOperation::UpdateMany, Self::scoped(filter), update, options)
            .await
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Physically remove the non-deleted record with identity `id`
    ///
    /// # Errors
    ///
    /// `NotFound` when no non-deleted record has this identity.
    pub async fn delete_by_id(&self, id: &str, options: DeleteOptions) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::Delete;
        let filter = Self::scoped(Self::id_filter(id));
        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %filter.summary(),
            "deleting record"
        );
        let store_options = StoreOptions {
            session: options.session,
            max_time: options.max_time.or(self.defaults.max_time),
            hint: options.hint,
            collation: options.collation,
            ..StoreOptions::default()
        };
        let doc = self
            .store
            .find_one_and_delete(T::COLLECTION, &filter, &SortSpec::none(), &store_options)
            .await
            .map_err(store_error(operation))?
            .ok_or_else(|| Self::not_found(id, operation))?;
        Record::from_document(doc, self.resolve_lean(options.lean), operation)
    }

    /// Physically remove every non-deleted match
    pub async fn delete_many(
        &self,
        filter: Filter,
        options: DeleteOptions,
    ) -> RepositoryResult<DeleteOutcome> {
        let operation = RepositoryOperation::DeleteMany;
        let filter = Self::scoped(filter);
        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %filter.summary(),
            "deleting records"
        );
        let store_options = StoreOptions {
            session: options.session,
            max_time: options.max_time.or(self.defaults.max_time),
            hint: options.hint,
            collation: options.collation,
            ..StoreOptions::default()
        };
        self.store
            .delete_many(T::COLLECTION, &filter, &store_options)
            .await
            .map_err(store_error(operation))
    }

    /// Mark the non-deleted record with identity `id` as deleted
    ///
    /// # Errors
    ///
    /// `NotFound` when the record does not exist or is already deleted.
    pub async fn soft_delete_by_id(
        &self,
        id: &str,
        options: UpdateOptions,
    ) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::SoftDelete;
        let update = Update::new().set(T::SOFT_DELETE_FIELD, true);
        self.modify_one(
            operation,
            Self::scoped(Self::id_filter(id)),
            update,
            options.skip_validators(),
        )
        .await?
        .ok_or_else(|| Self::not_found(id, operation))
    }

    /// Mark every non-deleted match as deleted; returns the marked records
    pub async fn soft_delete_many(
        &self,
        filter: Filter,
        options: UpdateOptions,
    ) -> RepositoryResult<Vec<Record<T>>> {
        let update = Update::new().set(T::SOFT_DELETE_FIELD, true);
        self.modify_many(
            RepositoryOperation::SoftDelete,
            Self::scoped(filter),
            update,
            options.skip_validators(),
        )
        .await
    }

    /// Clear the deleted marker of the record with identity `id`
    ///
    /// # Errors
    ///
    /// `NotFound` when no soft-deleted record has this identity.
    pub async fn restore_by_id(&self, id: &str, options: UpdateOptions) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::Restore;
        let filter = SoftDeleteScope::DeletedOnly.apply(T::SOFT_DELETE_FIELD, Self::id_filter(id));
        let update = Update::new().set(T::SOFT_DELETE_FIELD, false);
        self.modify_one(operation, filter, update, options.skip_validators())
            .await?
            .ok_or_else(|| Self::not_found(id, operation))
    }

    // ------------------------------------------------------------------
    // Count
    // ------------------------------------------------------------------

    /// Number of matches within `options.scope`
    pub async fn count_documents(&self, filter: Filter, options: CountOptions) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Count;
        let spec = CountSpec {
            filter: options.scope.apply(T::SOFT_DELETE_FIELD, filter),
            skip: options.skip,
            limit: options.limit,
        };
        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %spec.filter.summary(),
            "counting records"
        );
        let store_options = StoreOptions {
            session: options.session,
            max_time: options.max_time.or(self.defaults.max_time),
            hint: options.hint,
            collation: options.collation,
            ..StoreOptions::default()
        };
        self.store
            .count(T::COLLECTION, &spec, &store_options)
            .await
            .map_err(store_error(operation))
    }

    /// Whether any non-deleted record matches `filter`
    pub async fn exists(&self, filter: Filter) -> RepositoryResult<bool> {
        let count = self
            .count_documents(filter, CountOptions::new().limit(1))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Exists))?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // Composite
    // ------------------------------------------------------------------

    /// Return the first non-deleted match, creating `data` when none exists
    ///
    /// Lookup and insert are separate calls. When a concurrent caller wins
    /// the insert and a unique index rejects ours, the lookup is repeated
    /// once.
    pub async fn find_or_create(
        &self,
        filter: Filter,
        data: T,
        options: CreateOptions,
    ) -> RepositoryResult<Record<T>> {
        let operation = RepositoryOperation::FindOrCreate;
        let lookup = FindOneParams::new(filter).options(QueryOptions {
            session: options.session.clone(),
            lean: options.lean,
            ..QueryOptions::default()
        });

        if let Some(found) = self.find_first(lookup.clone(), operation).await? {
            return Ok(found);
        }

        match self.create_one(data, options).await {
            Ok(created) => Ok(created),
            Err(error) if error.kind == RepositoryErrorKind::AlreadyExists => {
                tracing::warn!(
                    collection = T::COLLECTION,
                    "create lost a race with a concurrent insert, looking up again"
                );
                self.find_first(lookup, operation)
                    .await?
                    .ok_or_else(|| error.with_operation(operation))
            }
            Err(error) => Err(error.with_operation(operation)),
        }
    }

    /// Run a caller-supplied pipeline
    ///
    /// No soft-delete predicate is added; include a `Match` stage when
    /// needed.
    pub async fn aggregate(
        &self,
        pipeline: &[Stage],
        options: AggregateOptions,
    ) -> RepositoryResult<Vec<Document>> {
        let operation = RepositoryOperation::Aggregate;
        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            stages = pipeline.len(),
            "running pipeline"
        );
        let mut store_options = options.store_options();
        store_options.max_time = store_options.max_time.or(self.defaults.max_time);
        self.store
            .aggregate(T::COLLECTION, pipeline, &store_options)
            .await
            .map_err(store_error(operation))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Open a store session
    pub async fn start_session(&self) -> RepositoryResult<Session> {
        self.store
            .start_session()
            .await
            .map_err(store_error(RepositoryOperation::Transaction))
    }

    /// Run `work` inside a transaction on a fresh session
    ///
    /// The transaction commits when `work` returns `Ok` and aborts when it
    /// returns `Err` or panics. The session is ended on every path and a
    /// panic is resumed afterwards. Conflicts are not retried.
    pub async fn with_transaction<R, F, Fut>(&self, work: F) -> RepositoryResult<R>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = RepositoryResult<R>>,
    {
        let session = self.start_session().await?;
        let outcome = self.run_transaction(&session, work).await;

        if let Err(error) = self.store.end_session(&session).await {
            tracing::warn!(session = %session.id(), error = %error, "failed to end session");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn run_transaction<R, F, Fut>(
        &self,
        session: &Session,
        work: F,
    ) -> Result<RepositoryResult<R>, Box<dyn Any + Send>>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = RepositoryResult<R>>,
    {
        let operation = RepositoryOperation::Transaction;
        if let Err(error) = self.store.start_transaction(session).await {
            return Ok(Err(RepositoryError::from_store(operation, error)));
        }

        let handle = session.clone();
        let result = AssertUnwindSafe(async move { work(handle).await })
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(value)) => match self.store.commit_transaction(session).await {
                Ok(()) => Ok(Ok(value)),
                Err(error) => {
                    tracing::debug!(session = %session.id(), error = %error, "commit failed");
                    Ok(Err(RepositoryError::from_store(operation, error)))
                }
            },
            Ok(Err(error)) => {
                self.abort_quietly(session).await;
                Ok(Err(error))
            }
            Err(panic) => {
                self.abort_quietly(session).await;
                Err(panic)
            }
        }
    }

    async fn abort_quietly(&self, session: &Session) {
        if let Err(error) = self.store.abort_transaction(session).await {
            tracing::warn!(session = %session.id(), error = %error, "failed to abort transaction");
        }
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::store::{IndexSpec, InMemoryStore};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        title: String,
        #[serde(default)]
        views: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_deleted: Option<bool>,
    }

    impl ManagedRecord for Note {
        const COLLECTION: &'static str = "notes";
        const ENTITY_NAME: &'static str = "Note";

        fn validate(&self) -> RepositoryResult<()> {
            if self.title.is_empty() {
                return Err(RepositoryError::validation_failed("title must not be empty"));
            }
            Ok(())
        }
    }

    fn note(title: &str) -> Note {
        Note {
            id: None,
            title: title.to_string(),
            views: 0,
            is_deleted: None,
        }
    }

    fn repository() -> GenericRepository<Note, InMemoryStore> {
        GenericRepository::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_fills_managed_fields() {
        let repo = repository();
        let created = repo.create_one(note("a"), CreateOptions::new()).await.unwrap();

        let doc = created.as_document().unwrap();
        assert!(doc.get("_id").and_then(Value::as_str).is_some());
        assert_eq!(doc.get("isDeleted"), Some(&json!(false)));
        assert!(doc.get(CREATED_AT).is_some());
        assert_eq!(doc.get(CREATED_AT), doc.get(UPDATED_AT));
    }

    #[tokio::test]
    async fn test_create_keeps_arity() {
        let repo = repository();
        let one = repo
            .create(OneOrMany::One(note("a")), CreateOptions::new())
            .await
            .unwrap();
        assert!(matches!(one, OneOrMany::One(_)));

        let many = repo
            .create(OneOrMany::Many(vec![note("b"), note("c")]), CreateOptions::new())
            .await
            .unwrap();
        assert_eq!(many.len(), 2);

        let empty = repo
            .create(OneOrMany::Many(vec![]), CreateOptions::new())
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_validation_runs_unless_skipped() {
        let repo = repository();
        let error = repo.create_one(note(""), CreateOptions::new()).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(error.operation, RepositoryOperation::Create);

        assert!(repo
            .create_one(note(""), CreateOptions::new().skip_validation())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_batch_is_already_exists() {
        let repo = repository();
        repo.store()
            .create_index("notes", IndexSpec::new("title_1", &["title"]).unique())
            .await
            .unwrap();
        repo.create_one(note("dup"), CreateOptions::new()).await.unwrap();

        let error = repo
            .create_many(vec![note("fresh"), note("dup")], CreateOptions::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(repo.store().documents("notes").await.len(), 1);
    }

    #[tokio::test]
    async fn test_hydrated_reads() {
        let repo = repository();
        let id = repo
            .create_one(note("typed"), CreateOptions::new())
            .await
            .unwrap()
            .id()
            .unwrap();

        let found = repo
            .find_by_id(&id, QueryOptions::new().with_lean(false))
            .await
            .unwrap();
        assert_eq!(found.as_record().map(|n| n.title.as_str()), Some("typed"));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_and_restore_reveals() {
        let repo = repository();
        let id = repo
            .create_one(note("gone"), CreateOptions::new())
            .await
            .unwrap()
            .id()
            .unwrap();

        let deleted = repo.soft_delete_by_id(&id, UpdateOptions::new()).await.unwrap();
        assert_eq!(deleted.get("isDeleted"), Some(json!(true)));

        let error = repo.find_by_id(&id, FindByIdParams::default()).await.unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_id.as_deref(), Some(id.as_str()));

        let again = repo.soft_delete_by_id(&id, UpdateOptions::new()).await.unwrap_err();
        assert_eq!(again.kind, RepositoryErrorKind::NotFound);
        assert_eq!(again.operation, RepositoryOperation::SoftDelete);

        let restored = repo.restore_by_id(&id, UpdateOptions::new()).await.unwrap();
        assert_eq!(restored.get("isDeleted"), Some(json!(false)));
        assert!(repo.find_by_id(&id, FindByIdParams::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_stamps_updated_at() {
        let repo = repository();
        let created = repo.create_one(note("t"), CreateOptions::new()).await.unwrap();
        let id = created.id().unwrap();

        let pinned = "2020-01-01T00:00:00.000Z";
        let updated = repo
            .update_by_id(
                &id,
                Update::new().inc("views", 2).set(UPDATED_AT, pinned),
                UpdateOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(updated.get("views"), Some(json!(2)));
        assert_eq!(updated.get(UPDATED_AT), Some(json!(pinned)));

        let before = repo
            .update_by_id(&id, Update::new().inc("views", 1), UpdateOptions::new().return_old())
            .await
            .unwrap();
        assert_eq!(before.get("views"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_update_many_returns_affected_records() {
        let repo = repository();
        repo.create_many(vec![note("x"), note("x"), note("y")], CreateOptions::new())
            .await
            .unwrap();

        let updated = repo
            .update_many(Filter::eq("title", "x"), Update::new().set("views", 7), UpdateOptions::new())
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|r| r.get("views") == Some(json!(7))));

        let none = repo
            .update_many(Filter::eq("title", "zzz"), Update::new().set("views", 1), UpdateOptions::new())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_count_and_exists_respect_scope() {
        let repo = repository();
        let ids: Vec<String> = repo
            .create_many(vec![note("a"), note("b"), note("c")], CreateOptions::new())
            .await
            .unwrap()
            .iter()
            .filter_map(Record::id)
            .collect();
        repo.soft_delete_by_id(&ids[0], UpdateOptions::new()).await.unwrap();

        assert_eq!(repo.count_documents(Filter::default(), CountOptions::new()).await.unwrap(), 2);
        assert_eq!(
            repo.count_documents(Filter::default(), CountOptions::new().scope(SoftDeleteScope::DeletedOnly))
                .await
                .unwrap(),
            1
        );
        assert!(!repo.exists(Filter::eq("title", "a")).await.unwrap());
        assert!(repo.exists(Filter::eq("title", "b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_latest_orders_by_creation() {
        let repo = repository();
        for (title, created_at) in [("old", "2024-01-01T00:00:00.000Z"), ("new", "2024-06-01T00:00:00.000Z")] {
            repo.store()
                .insert_many(
                    "notes",
                    vec![json!({"title": title, "createdAt": created_at, "isDeleted": false})
                        .as_object()
                        .cloned()
                        .unwrap()],
                    &StoreOptions::default(),
                )
                .await
                .unwrap();
        }

        let latest = repo
            .find_latest(FindOneParams::new(Filter::default()).sort(SortKey::asc(CREATED_AT)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.get("title"), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_batch_load_skips_deleted() {
        let repo = repository();
        let ids: Vec<String> = repo
            .create_many(vec![note("a"), note("b")], CreateOptions::new())
            .await
            .unwrap()
            .iter()
            .filter_map(Record::id)
            .collect();
        repo.soft_delete_by_id(&ids[1], UpdateOptions::new()).await.unwrap();

        let mut wanted = ids.clone();
        wanted.push("missing".to_string());
        let loaded = repo.batch_load(&wanted, QueryOptions::new()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&ids[0]));
        assert!(repo.batch_load(&[], QueryOptions::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_default_options_merges() {
        let mut repo = repository();
        repo.set_default_options(QueryOptions::new().with_lean(false));
        assert_eq!(repo.default_options().lean, Some(false));
        assert_eq!(
            repo.default_options().max_time,
            repo.settings().default_max_time()
        );
        assert!(!repo.resolve_lean(None));
        assert!(repo.resolve_lean(Some(true)));
    }
}
