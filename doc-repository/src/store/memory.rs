//! In-memory [`DocumentStore`] backend
//!
//! Collections live behind a single `tokio` read/write lock. Writes run
//! against a copy of the collection and replace it only when the whole
//! operation (including unique index checks) succeeds.
//!
//! Transactions take a snapshot of each collection on first access. Commit
//! fails with [`StoreError::WriteConflict`] if a collection the transaction
//! wrote to was changed by someone else in the meantime.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::pipeline::{self, PipelineContext};
use super::types::{
    CountSpec, DeleteOutcome, Document, FindAndModify, FindSpec, IndexHint, IndexSpec, Projection,
    ReturnDocument, Session, Stage, StoreOptions, Update, UpdateOutcome, ID_FIELD,
};
use super::{eval, path, DocumentStore};
use crate::query::{Filter, Predicate, SortSpec};

const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, Default)]
struct CollectionData {
    documents: Vec<Document>,
    version: u64,
    indexes: Vec<IndexSpec>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, CollectionData>,
}

#[derive(Debug, Default)]
struct Transaction {
    working: HashMap<String, CollectionData>,
    base_versions: HashMap<String, u64>,
    dirty: HashSet<String>,
}

impl Transaction {
    fn working(&mut self, state: &StoreState, name: &str) -> &mut CollectionData {
        self.working.entry(name.to_string()).or_insert_with(|| {
            let committed = state.collections.get(name).cloned().unwrap_or_default();
            self.base_versions.insert(name.to_string(), committed.version);
            committed
        })
    }
}

#[derive(Debug, Default)]
struct SessionState {
    transaction: Option<Transaction>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<StoreState>,
    sessions: DashMap<Uuid, SessionState>,
    latency_ms: AtomicU64,
}

/// Reference [`DocumentStore`] keeping every collection in memory
///
/// Cloning is cheap; clones share the same data.
///
/// # Example
///
/// ```rust
/// use doc_repository::store::{DocumentStore, FindSpec, InMemoryStore, StoreOptions};
/// use serde_json::json;
///
/// # tokio_test_block(async {
/// let store = InMemoryStore::new();
/// let doc = json!({"title": "hello"}).as_object().cloned().unwrap();
/// let inserted = store.insert_many("notes", vec![doc], &StoreOptions::default()).await.unwrap();
/// assert!(inserted[0].contains_key("_id"));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store that delays every operation by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        let store = Self::new();
        store.set_latency(latency);
        store
    }

    /// Change the simulated latency; zero disables it
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(millis, Ordering::Relaxed);
    }

    /// Declare an index; unique indexes are checked against existing data
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if existing documents violate a
    /// unique index, or [`StoreError::InvalidOperation`] if the name is taken.
    pub async fn create_index(&self, collection: &str, index: IndexSpec) -> StoreResult<()> {
        let mut state = self.inner.state.write().await;
        let data = state.collections.entry(collection.to_string()).or_default();
        if index.name == ID_INDEX || data.indexes.iter().any(|i| i.name == index.name) {
            return Err(StoreError::InvalidOperation(format!(
                "index '{}' already exists",
                index.name
            )));
        }
        let mut draft = data.clone();
        draft.indexes.push(index);
        check_unique(collection, &draft)?;
        data.indexes = draft.indexes;
        tracing::debug!(collection = %collection, "index created");
        Ok(())
    }

    /// Committed documents of a collection, in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.inner.state.read().await;
        state
            .collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Number of open sessions
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    fn latency(&self) -> Option<Duration> {
        match self.inner.latency_ms.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }

    /// Apply simulated latency and the execution-time ceiling
    async fn guarded<T, F>(&self, options: &StoreOptions, work: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let latency = self.latency();
        let run = async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            work.await
        };
        match options.max_time {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => run.await,
        }
    }

    fn read_collection<R>(
        &self,
        state: &StoreState,
        session: Option<&Session>,
        name: &str,
        f: impl FnOnce(&CollectionData) -> StoreResult<R>,
    ) -> StoreResult<R> {
        if let Some(session) = session {
            let mut entry = self
                .inner
                .sessions
                .get_mut(&session.id())
                .ok_or_else(|| StoreError::SessionNotFound(session.id().to_string()))?;
            if let Some(txn) = entry.transaction.as_mut() {
                return f(txn.working(state, name));
            }
        }
        match state.collections.get(name) {
            Some(data) => f(data),
            None => f(&CollectionData::default()),
        }
    }

    fn write_collection<R>(
        &self,
        state: &mut StoreState,
        session: Option<&Session>,
        name: &str,
        f: impl FnOnce(&mut CollectionData) -> StoreResult<R>,
    ) -> StoreResult<R> {
        if let Some(session) = session {
            let mut entry = self
                .inner
                .sessions
                .get_mut(&session.id())
                .ok_or_else(|| StoreError::SessionNotFound(session.id().to_string()))?;
            if let Some(txn) = entry.transaction.as_mut() {
                let data = txn.working(state, name);
                let mut draft = data.clone();
                let result = f(&mut draft)?;
                if draft.documents != data.documents {
                    *data = draft;
                    txn.dirty.insert(name.to_string());
                }
                return Ok(result);
            }
        }

        let mut draft = state.collections.get(name).cloned().unwrap_or_default();
        let result = f(&mut draft)?;
        let changed = state
            .collections
            .get(name)
            .map_or(!draft.documents.is_empty(), |c| c.documents != draft.documents);
        if changed {
            draft.version += 1;
            state.collections.insert(name.to_string(), draft);
        }
        Ok(result)
    }

    fn snapshot_documents(
        &self,
        state: &StoreState,
        session: Option<&Session>,
        name: &str,
    ) -> StoreResult<Vec<Document>> {
        self.read_collection(state, session, name, |data| Ok(data.documents.clone()))
    }
}

fn new_object_id() -> Value {
    Value::String(Uuid::now_v7().simple().to_string())
}

fn check_hint(data: &CollectionData, hint: Option<&IndexHint>) -> StoreResult<()> {
    let Some(hint) = hint else {
        return Ok(());
    };
    let known = match hint {
        IndexHint::Name(name) => name == ID_INDEX || data.indexes.iter().any(|i| &i.name == name),
        IndexHint::Fields(fields) => {
            matches!(fields.as_slice(), [only] if only == ID_FIELD)
                || data.indexes.iter().any(|i| &i.fields == fields)
        }
    };
    if known {
        Ok(())
    } else {
        Err(StoreError::BadHint(hint.to_string()))
    }
}

/// Enforce `_id` and declared unique indexes
///
/// Documents missing every field of an index are not indexed.
fn check_unique(collection: &str, data: &CollectionData) -> StoreResult<()> {
    let duplicate = |index: &str, key: String| StoreError::DuplicateKey {
        collection: collection.to_string(),
        index: index.to_string(),
        key,
    };

    let mut ids = HashSet::new();
    for doc in &data.documents {
        if let Some(id) = doc.get(ID_FIELD) {
            let key = id.to_string();
            if !ids.insert(key.clone()) {
                return Err(duplicate(ID_INDEX, key));
            }
        }
    }

    for index in data.indexes.iter().filter(|i| i.unique) {
        let mut seen = HashSet::new();
        for doc in &data.documents {
            if index
                .partial
                .as_ref()
                .is_some_and(|partial| !eval::matches(partial, doc, None))
            {
                continue;
            }
            let key: Vec<Value> = index
                .fields
                .iter()
                .map(|f| path::get(doc, f).cloned().unwrap_or(Value::Null))
                .collect();
            if key.iter().all(Value::is_null) {
                continue;
            }
            let rendered = Value::Array(key).to_string();
            if !seen.insert(rendered.clone()) {
                return Err(duplicate(&index.name, rendered));
            }
        }
    }
    Ok(())
}

/// Indexes of matching documents, ordered by `sort`
fn matching_positions(
    data: &CollectionData,
    filter: &Filter,
    sort: &SortSpec,
    options: &StoreOptions,
) -> Vec<usize> {
    let collation = options.collation.as_ref();
    let mut positions: Vec<usize> = data
        .documents
        .iter()
        .enumerate()
        .filter(|(_, d)| eval::matches(filter, d, collation))
        .map(|(i, _)| i)
        .collect();
    if !sort.is_empty() {
        let ignore_case = collation.is_some_and(|c| c.ignores_case());
        positions.sort_by(|&a, &b| {
            eval::compare_documents(&data.documents[a], &data.documents[b], sort, ignore_case)
        });
    }
    positions
}

/// New document for an upsert: equality conditions of the filter, then
/// insert-only fields the filter left unset, then the update
fn upsert_seed(filter: &Filter, update: &Update) -> StoreResult<Document> {
    fn seed(filter: &Filter, doc: &mut Document) {
        match filter {
            Filter::Condition(condition) => {
                if let Predicate::Eq(value) = &condition.predicate {
                    path::set(doc, &condition.field, value.to_json());
                }
            }
            Filter::And(members) => members.iter().for_each(|m| seed(m, doc)),
            _ => {}
        }
    }

    let mut doc = Document::new();
    seed(filter, &mut doc);
    for (field, value) in &update.set_on_insert {
        if path::get(&doc, field).is_none() {
            path::set(&mut doc, field, value.clone());
        }
    }
    update.apply(&mut doc)?;
    if !doc.contains_key(ID_FIELD) {
        doc.insert(ID_FIELD.to_string(), new_object_id());
    }
    Ok(doc)
}

fn project(doc: Document, projection: Option<&Projection>) -> Document {
    match projection {
        Some(p) => p.apply(doc),
        None => doc,
    }
}

fn id_of(doc: &Document) -> Value {
    doc.get(ID_FIELD).cloned().unwrap_or(Value::Null)
}

impl DocumentStore for InMemoryStore {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &StoreOptions,
    ) -> StoreResult<Vec<Document>> {
        self.guarded(options, async {
            let mut state = self.inner.state.write().await;
            self.write_collection(&mut state, options.session.as_ref(), collection, |data| {
                let mut inserted = Vec::with_capacity(documents.len());
                for mut doc in documents {
                    if !doc.contains_key(ID_FIELD) {
                        doc.insert(ID_FIELD.to_string(), new_object_id());
                    }
                    inserted.push(doc.clone());
                    data.documents.push(doc);
                }
                check_unique(collection, data)?;
                Ok(inserted)
            })
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
        options: &StoreOptions,
    ) -> StoreResult<Vec<Document>> {
        self.guarded(options, async {
            let state = self.inner.state.read().await;
            self.read_collection(&state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let positions = matching_positions(data, &spec.filter, &spec.sort, options);
                let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
                let limit = spec
                    .limit
                    .filter(|l| *l > 0)
                    .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
                Ok(positions
                    .into_iter()
                    .skip(skip)
                    .take(limit)
                    .map(|i| project(data.documents[i].clone(), spec.projection.as_ref()))
                    .collect())
            })
        })
        .await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        spec: &FindAndModify,
        options: &StoreOptions,
    ) -> StoreResult<Option<Document>> {
        self.guarded(options, async {
            let mut state = self.inner.state.write().await;
            self.write_collection(&mut state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let target = matching_positions(data, &spec.filter, &spec.sort, options)
                    .into_iter()
                    .next();
                let result = match target {
                    Some(index) => {
                        let before = data.documents[index].clone();
                        spec.update.apply(&mut data.documents[index])?;
                        match spec.return_document {
                            ReturnDocument::Before => Some(before),
                            ReturnDocument::After => Some(data.documents[index].clone()),
                        }
                    }
                    None if spec.upsert => {
                        let doc = upsert_seed(&spec.filter, &spec.update)?;
                        data.documents.push(doc.clone());
                        match spec.return_document {
                            ReturnDocument::Before => None,
                            ReturnDocument::After => Some(doc),
                        }
                    }
                    None => None,
                };
                check_unique(collection, data)?;
                Ok(result.map(|d| project(d, spec.projection.as_ref())))
            })
        })
        .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: &StoreOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.guarded(options, async {
            let mut state = self.inner.state.write().await;
            self.write_collection(&mut state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let positions = matching_positions(data, filter, &SortSpec::none(), options);
                let mut outcome = UpdateOutcome {
                    matched_count: positions.len() as u64,
                    ..UpdateOutcome::default()
                };
                for index in positions {
                    let doc = &mut data.documents[index];
                    if update.apply(doc)? {
                        outcome.modified_count += 1;
                    }
                    outcome.affected_ids.push(id_of(doc));
                }
                check_unique(collection, data)?;
                Ok(outcome)
            })
        })
        .await
    }

    async fn find_one_and_delete(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &SortSpec,
        options: &StoreOptions,
    ) -> StoreResult<Option<Document>> {
        self.guarded(options, async {
            let mut state = self.inner.state.write().await;
            self.write_collection(&mut state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let target = matching_positions(data, filter, sort, options).into_iter().next();
                Ok(target.map(|index| data.documents.remove(index)))
            })
        })
        .await
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &StoreOptions,
    ) -> StoreResult<DeleteOutcome> {
        self.guarded(options, async {
            let mut state = self.inner.state.write().await;
            self.write_collection(&mut state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let collation = options.collation.as_ref();
                let mut outcome = DeleteOutcome::default();
                data.documents.retain(|doc| {
                    if eval::matches(filter, doc, collation) {
                        outcome.deleted_count += 1;
                        outcome.deleted_ids.push(id_of(doc));
                        false
                    } else {
                        true
                    }
                });
                Ok(outcome)
            })
        })
        .await
    }

    async fn count(&self, collection: &str, spec: &CountSpec, options: &StoreOptions) -> StoreResult<u64> {
        self.guarded(options, async {
            let state = self.inner.state.read().await;
            self.read_collection(&state, options.session.as_ref(), collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                let collation = options.collation.as_ref();
                let matched = data
                    .documents
                    .iter()
                    .filter(|d| eval::matches(&spec.filter, d, collation))
                    .count() as u64;
                let after_skip = matched.saturating_sub(spec.skip);
                Ok(match spec.limit.filter(|l| *l > 0) {
                    Some(limit) => after_skip.min(limit),
                    None => after_skip,
                })
            })
        })
        .await
    }

    async fn aggregate(
        &self,
        collection: &str,
        stages: &[Stage],
        options: &StoreOptions,
    ) -> StoreResult<Vec<Document>> {
        self.guarded(options, async {
            let state = self.inner.state.read().await;
            let session = options.session.as_ref();

            let mut foreign = HashMap::new();
            for target in pipeline::lookup_targets(stages) {
                let docs = self.snapshot_documents(&state, session, &target)?;
                foreign.insert(target, docs);
            }

            let input = self.read_collection(&state, session, collection, |data| {
                check_hint(data, options.hint.as_ref())?;
                Ok(data.documents.clone())
            })?;
            drop(state);

            let ctx = PipelineContext {
                foreign: &foreign,
                collation: options.collation.as_ref(),
            };
            pipeline::run(input, stages, &ctx)
        })
        .await
    }

    async fn start_session(&self) -> StoreResult<Session> {
        let session = Session::new();
        self.inner.sessions.insert(session.id(), SessionState::default());
        tracing::trace!(session = %session.id(), "session started");
        Ok(session)
    }

    async fn start_transaction(&self, session: &Session) -> StoreResult<()> {
        let mut entry = self
            .inner
            .sessions
            .get_mut(&session.id())
            .ok_or_else(|| StoreError::SessionNotFound(session.id().to_string()))?;
        if entry.transaction.is_some() {
            return Err(StoreError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        entry.transaction = Some(Transaction::default());
        tracing::debug!(session = %session.id(), "transaction started");
        Ok(())
    }

    async fn commit_transaction(&self, session: &Session) -> StoreResult<()> {
        let txn = {
            let mut entry = self
                .inner
                .sessions
                .get_mut(&session.id())
                .ok_or_else(|| StoreError::SessionNotFound(session.id().to_string()))?;
            entry
                .transaction
                .take()
                .ok_or_else(|| StoreError::Transaction("no transaction in progress".to_string()))?
        };

        let mut state = self.inner.state.write().await;
        for name in &txn.dirty {
            let committed = state.collections.get(name).map_or(0, |c| c.version);
            let base = txn.base_versions.get(name).copied().unwrap_or_default();
            if committed != base {
                tracing::debug!(session = %session.id(), collection = %name, "transaction write conflict");
                return Err(StoreError::WriteConflict(name.clone()));
            }
        }

        let Transaction { mut working, dirty, .. } = txn;
        for name in dirty {
            let Some(mut data) = working.remove(&name) else {
                continue;
            };
            if let Some(committed) = state.collections.get(&name) {
                data.version = committed.version + 1;
                data.indexes = committed.indexes.clone();
            } else {
                data.version += 1;
            }
            state.collections.insert(name, data);
        }
        tracing::debug!(session = %session.id(), "transaction committed");
        Ok(())
    }

    async fn abort_transaction(&self, session: &Session) -> StoreResult<()> {
        let mut entry = self
            .inner
            .sessions
            .get_mut(&session.id())
            .ok_or_else(|| StoreError::SessionNotFound(session.id().to_string()))?;
        entry
            .transaction
            .take()
            .ok_or_else(|| StoreError::Transaction("no transaction in progress".to_string()))?;
        tracing::debug!(session = %session.id(), "transaction aborted");
        Ok(())
    }

    async fn end_session(&self, session: &Session) -> StoreResult<()> {
        if let Some((_, state)) = self.inner.sessions.remove(&session.id()) {
            if state.transaction.is_some() {
                tracing::debug!(session = %session.id(), "ending session with open transaction, aborting");
            }
        }
        tracing::trace!(session = %session.id(), "session ended");
        Ok(())
    }
}
