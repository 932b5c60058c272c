//! Per-call parameter objects
//!
//! Each repository operation takes one of these. They are built per call
//! with `#[must_use]` builder methods, consumed once and never stored.
//! [`QueryOptions`] holds the modifiers shared by reads and doubles as the
//! repository-wide defaults.

use std::time::Duration;

use super::populate::Populate;
use super::scope::SoftDeleteScope;
use crate::query::{Filter, SortSpec};
use crate::store::{
    Collation, IndexHint, Projection, ReadConcern, ReadPreference, Session, StoreOptions,
};

/// Read modifiers: session, projection, relation expansion, hydration and
/// execution hints
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Field selection
    pub projection: Option<Projection>,
    /// Relations to expand
    pub populate: Vec<Populate>,
    /// Return plain documents instead of typed records
    pub lean: Option<bool>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// Replica selection
    pub read_preference: Option<ReadPreference>,
    /// Read isolation
    pub read_concern: Option<ReadConcern>,
    /// String comparison rules
    pub collation: Option<Collation>,
    /// Tag recorded with the operation
    pub comment: Option<String>,
}

impl QueryOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Apply a field projection
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Apply a select string such as `"title -body"`
    #[must_use]
    pub fn select(mut self, select: &str) -> Self {
        self.projection = Projection::from_select(select);
        self
    }

    /// Expand a relation
    #[must_use]
    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }

    /// Choose lean (`true`) or hydrated (`false`) results
    #[must_use]
    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }

    /// Set the execution-time ceiling
    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Use a specific index
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Set the read preference
    #[must_use]
    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }

    /// Set the read concern
    #[must_use]
    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    /// Set the collation
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Attach a comment
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Fill every unset field from `defaults`
    #[must_use]
    pub fn merged_with(mut self, defaults: &QueryOptions) -> Self {
        self.session = self.session.or_else(|| defaults.session.clone());
        self.projection = self.projection.or_else(|| defaults.projection.clone());
        if self.populate.is_empty() {
            self.populate = defaults.populate.clone();
        }
        self.lean = self.lean.or(defaults.lean);
        self.max_time = self.max_time.or(defaults.max_time);
        self.hint = self.hint.or_else(|| defaults.hint.clone());
        self.read_preference = self.read_preference.or(defaults.read_preference);
        self.read_concern = self.read_concern.or(defaults.read_concern);
        self.collation = self.collation.or_else(|| defaults.collation.clone());
        self.comment = self.comment.or_else(|| defaults.comment.clone());
        self
    }

    /// The store-level subset of these options
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            session: self.session.clone(),
            max_time: self.max_time,
            hint: self.hint.clone(),
            collation: self.collation.clone(),
            read_preference: self.read_preference,
            read_concern: self.read_concern,
            allow_disk_use: false,
            comment: self.comment.clone(),
        }
    }
}

/// Parameters for [`find_by_id`](super::GenericRepository::find_by_id)
pub type FindByIdParams = QueryOptions;

/// Parameters for [`find`](super::GenericRepository::find)
#[derive(Debug, Clone, Default)]
pub struct FindParams {
    /// Caller filter, combined with `scope`
    pub filter: Filter,
    /// Result order
    pub sort: SortSpec,
    /// Items to skip
    pub skip: u64,
    /// Maximum items; `None` or 0 means unlimited
    pub limit: Option<u64>,
    /// Cursor batch size hint
    pub batch_size: Option<u32>,
    /// Soft-delete visibility
    pub scope: SoftDeleteScope,
    /// Read modifiers
    pub options: QueryOptions,
}

impl FindParams {
    /// Find records matching `filter`
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Order results
    #[must_use]
    pub fn sort(mut self, sort: impl Into<SortSpec>) -> Self {
        self.sort = sort.into();
        self
    }

    /// Skip the first `skip` results
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Return at most `limit` results
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Cursor batch size
    #[must_use]
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Soft-delete visibility
    #[must_use]
    pub fn scope(mut self, scope: SoftDeleteScope) -> Self {
        self.scope = scope;
        self
    }

    /// Read modifiers
    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Parameters for single-record reads
#[derive(Debug, Clone, Default)]
pub struct FindOneParams {
    /// Caller filter, combined with `scope`
    pub filter: Filter,
    /// Picks the first match when several qualify
    pub sort: SortSpec,
    /// Soft-delete visibility
    pub scope: SoftDeleteScope,
    /// Read modifiers
    pub options: QueryOptions,
}

impl FindOneParams {
    /// Find the first record matching `filter`
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Order candidates
    #[must_use]
    pub fn sort(mut self, sort: impl Into<SortSpec>) -> Self {
        self.sort = sort.into();
        self
    }

    /// Soft-delete visibility
    #[must_use]
    pub fn scope(mut self, scope: SoftDeleteScope) -> Self {
        self.scope = scope;
        self
    }

    /// Read modifiers
    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Options for inserts
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Run [`ManagedRecord::validate`](super::ManagedRecord::validate) first
    pub validate_before_save: bool,
    /// Return plain documents
    pub lean: Option<bool>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            session: None,
            validate_before_save: true,
            lean: None,
        }
    }
}

impl CreateOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Skip record validation
    #[must_use]
    pub fn skip_validation(mut self) -> Self {
        self.validate_before_save = false;
        self
    }

    /// Choose lean or hydrated results
    #[must_use]
    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }
}

/// Options for find-and-modify and bulk updates
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Return the record after the update (`true`) or before it
    pub return_new: bool,
    /// Run [`ManagedRecord::validate_update`](super::ManagedRecord::validate_update) first
    pub run_validators: bool,
    /// Insert when nothing matches
    pub upsert: bool,
    /// Return plain documents
    pub lean: Option<bool>,
    /// Field selection on the returned record
    pub projection: Option<Projection>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// Picks the target when several records match
    pub sort: SortSpec,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            session: None,
            return_new: true,
            run_validators: true,
            upsert: false,
            lean: None,
            projection: None,
            max_time: None,
            hint: None,
            sort: SortSpec::none(),
        }
    }
}

impl UpdateOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Return the pre-update record
    #[must_use]
    pub fn return_old(mut self) -> Self {
        self.return_new = false;
        self
    }

    /// Skip update validation
    #[must_use]
    pub fn skip_validators(mut self) -> Self {
        self.run_validators = false;
        self
    }

    /// Insert when nothing matches
    #[must_use]
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    /// Choose lean or hydrated results
    #[must_use]
    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }

    /// Apply a field projection
    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the execution-time ceiling
    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Use a specific index
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Order candidates; the first one is updated
    #[must_use]
    pub fn sort(mut self, sort: impl Into<SortSpec>) -> Self {
        self.sort = sort.into();
        self
    }
}

/// Options for physical deletes
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// String comparison rules
    pub collation: Option<Collation>,
    /// Return plain documents
    pub lean: Option<bool>,
}

impl DeleteOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the execution-time ceiling
    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Use a specific index
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Choose lean or hydrated results
    #[must_use]
    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }
}

/// Options for counting
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// Matches to skip before counting
    pub skip: u64,
    /// Stop counting at this many
    pub limit: Option<u64>,
    /// String comparison rules
    pub collation: Option<Collation>,
    /// Soft-delete visibility
    pub scope: SoftDeleteScope,
}

impl CountOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the execution-time ceiling
    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Use a specific index
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Skip matches before counting
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Cap the count
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Soft-delete visibility
    #[must_use]
    pub fn scope(mut self, scope: SoftDeleteScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Options for caller-supplied pipelines
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Session to run in
    pub session: Option<Session>,
    /// Allow stages to spill to disk
    pub allow_disk_use: bool,
    /// Replica selection
    pub read_preference: Option<ReadPreference>,
    /// Read isolation
    pub read_concern: Option<ReadConcern>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// String comparison rules
    pub collation: Option<Collation>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Tag recorded with the operation
    pub comment: Option<String>,
}

impl AggregateOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `session`
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Allow stages to spill to disk
    #[must_use]
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = allow;
        self
    }

    /// Set the read preference
    #[must_use]
    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }

    /// Use a specific index
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Set the collation
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Set the execution-time ceiling
    #[must_use]
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            session: self.session.clone(),
            max_time: self.max_time,
            hint: self.hint.clone(),
            collation: self.collation.clone(),
            read_preference: self.read_preference,
            read_concern: self.read_concern,
            allow_disk_use: self.allow_disk_use,
            comment: self.comment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_call_values() {
        let defaults = QueryOptions::new()
            .with_lean(true)
            .with_max_time(Duration::from_secs(30))
            .with_comment("default");
        let merged = QueryOptions::new()
            .with_lean(false)
            .merged_with(&defaults);
        assert_eq!(merged.lean, Some(false));
        assert_eq!(merged.max_time, Some(Duration::from_secs(30)));
        assert_eq!(merged.comment.as_deref(), Some("default"));
    }

    #[test]
    fn test_select_builds_projection() {
        let options = QueryOptions::new().select("-body -secret");
        assert_eq!(
            options.projection,
            Some(Projection::Exclude(vec!["body".into(), "secret".into()]))
        );
    }

    #[test]
    fn test_store_options_carry_modifiers() {
        let session = Session::new();
        let options = QueryOptions::new()
            .with_session(session.clone())
            .with_hint("title_1")
            .with_max_time(Duration::from_millis(5));
        let store = options.store_options();
        assert_eq!(store.session, Some(session));
        assert_eq!(store.hint, Some(IndexHint::Name("title_1".into())));
        assert_eq!(store.max_time, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_write_option_defaults() {
        let update = UpdateOptions::default();
        assert!(update.return_new);
        assert!(update.run_validators);
        assert!(!update.upsert);
        assert!(CreateOptions::default().validate_before_save);
        assert!(!CreateOptions::new().skip_validation().validate_before_save);
    }
}
