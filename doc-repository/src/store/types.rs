//! Request and response types shared by every document store backend

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::path;
use crate::query::{Filter, SortSpec};

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

/// Identity field every store assigns
pub const ID_FIELD: &str = "_id";

/// Which replica members a read may be served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Primary only
    #[default]
    Primary,
    /// Primary, falling back to secondaries
    PrimaryPreferred,
    /// Secondaries only
    Secondary,
    /// Secondaries, falling back to primary
    SecondaryPreferred,
    /// Lowest latency member
    Nearest,
}

/// Isolation level requested for reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadConcern {
    /// Most recent data on the queried node
    #[default]
    Local,
    /// Lowest latency, may read orphaned data
    Available,
    /// Data acknowledged by a majority
    Majority,
    /// Reflects all prior majority writes
    Linearizable,
    /// Point-in-time snapshot
    Snapshot,
}

/// String comparison rules for sorting and matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    /// ICU locale, e.g. `en`
    pub locale: String,
    /// Comparison level 1-5; 1 and 2 ignore case
    #[serde(default = "default_strength")]
    pub strength: u8,
    /// Distinguish case at strength 1 or 2
    #[serde(default)]
    pub case_level: bool,
    /// Compare digit runs numerically
    #[serde(default)]
    pub numeric_ordering: bool,
}

fn default_strength() -> u8 {
    3
}

impl Collation {
    /// Collation with the default strength for `locale`
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            strength: default_strength(),
            case_level: false,
            numeric_ordering: false,
        }
    }

    /// Case-insensitive collation (strength 2)
    pub fn case_insensitive(locale: impl Into<String>) -> Self {
        Self {
            strength: 2,
            ..Self::new(locale)
        }
    }

    /// Whether string comparison ignores case
    pub fn ignores_case(&self) -> bool {
        self.strength <= 2 && !self.case_level
    }
}

/// Index selection for a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexHint {
    /// Index name
    Name(String),
    /// Index key fields, in order
    Fields(Vec<String>),
}

impl fmt::Display for IndexHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Fields(fields) => write!(f, "{{{}}}", fields.join(", ")),
        }
    }
}

impl From<&str> for IndexHint {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Secondary index declaration
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Index name, used by hints and duplicate-key errors
    pub name: String,
    /// Key fields
    pub fields: Vec<String>,
    /// Reject duplicate keys
    pub unique: bool,
    /// Only documents matching this filter are indexed
    pub partial: Option<Filter>,
}

impl IndexSpec {
    /// Non-unique index over `fields`
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            unique: false,
            partial: None,
        }
    }

    /// Mark the index unique
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Restrict the index to documents matching `filter`
    #[must_use]
    pub fn partial(mut self, filter: Filter) -> Self {
        self.partial = Some(filter);
        self
    }
}

/// Field selection applied to returned documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these paths (plus `_id`)
    Include(Vec<String>),
    /// Drop these paths
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a select string such as `"title author"` or `"-secret -__v"`
    ///
    /// Returns `None` for a blank string. When inclusions and exclusions are
    /// mixed, the inclusions win.
    pub fn from_select(select: &str) -> Option<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for token in select.split(|c: char| c.is_whitespace() || c == ',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.strip_prefix('-') {
                Some(field) if !field.is_empty() => exclude.push(field.to_string()),
                Some(_) => {}
                None => include.push(token.trim_start_matches('+').to_string()),
            }
        }
        if !include.is_empty() {
            if !exclude.is_empty() {
                tracing::warn!(select = %select, "mixed projection, ignoring exclusions");
            }
            Some(Self::Include(include))
        } else if !exclude.is_empty() {
            Some(Self::Exclude(exclude))
        } else {
            None
        }
    }

    /// Apply the projection to a document
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Self::Include(fields) => {
                let mut out = Document::new();
                if let Some(id) = doc.get(ID_FIELD) {
                    out.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    if let Some(value) = path::get(&doc, field) {
                        path::set(&mut out, field, value.clone());
                    }
                }
                out
            }
            Self::Exclude(fields) => {
                let mut doc = doc;
                for field in fields {
                    path::remove(&mut doc, field);
                }
                doc
            }
        }
    }
}

/// Handle to a store session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    id: Uuid,
}

impl Session {
    /// New session handle with a random id
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Field modifications applied by update operations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    /// Paths to assign
    pub set: Document,
    /// Paths to remove
    pub unset: Vec<String>,
    /// Paths to increment by a number
    pub inc: Document,
    /// Paths assigned only when an upsert inserts a new document
    pub set_on_insert: Document,
}

impl Update {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Update that assigns every field of `doc`
    pub fn from_document(doc: Document) -> Self {
        Self {
            set: doc,
            ..Self::default()
        }
    }

    /// Assign `path = value`
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }

    /// Remove `path`
    #[must_use]
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    /// Increment `path` by `by`
    #[must_use]
    pub fn inc(mut self, path: impl Into<String>, by: impl Into<Value>) -> Self {
        self.inc.insert(path.into(), by.into());
        self
    }

    /// Assign `path = value` only if an upsert inserts
    #[must_use]
    pub fn set_on_insert(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_on_insert.insert(path.into(), value.into());
        self
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    /// Whether the update assigns `path`
    pub fn sets(&self, path: &str) -> bool {
        self.set.contains_key(path)
    }

    /// Apply to `doc`; returns whether the document changed
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] when the update touches `_id`
    /// or increments a non-numeric field.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<bool> {
        let before = doc.clone();
        for (field, value) in &self.set {
            if field == ID_FIELD && doc.get(ID_FIELD).is_some_and(|id| id != value) {
                return Err(StoreError::InvalidOperation(
                    "the _id field cannot be modified".to_string(),
                ));
            }
            path::set(doc, field, value.clone());
        }
        for field in &self.unset {
            if field == ID_FIELD {
                return Err(StoreError::InvalidOperation(
                    "the _id field cannot be removed".to_string(),
                ));
            }
            path::remove(doc, field);
        }
        for (field, delta) in &self.inc {
            let Some(delta_num) = delta.as_f64() else {
                return Err(StoreError::InvalidOperation(format!(
                    "cannot increment '{field}' by non-numeric value {delta}"
                )));
            };
            let (current, integral) = match path::get(doc, field) {
                None | Some(Value::Null) => (0.0, true),
                Some(v) => {
                    let n = v.as_f64().ok_or_else(|| {
                        StoreError::InvalidOperation(format!(
                            "cannot increment non-numeric field '{field}'"
                        ))
                    })?;
                    (n, v.is_i64())
                }
            };
            let next = if integral && delta.is_i64() {
                Value::from((current + delta_num) as i64)
            } else {
                serde_json::Number::from_f64(current + delta_num)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            };
            path::set(doc, field, next);
        }
        Ok(*doc != before)
    }
}

/// Common per-call modifiers understood by stores
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Session the call runs in
    pub session: Option<Session>,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// String comparison rules
    pub collation: Option<Collation>,
    /// Replica selection
    pub read_preference: Option<ReadPreference>,
    /// Read isolation
    pub read_concern: Option<ReadConcern>,
    /// Permit spilling large sorts to disk
    pub allow_disk_use: bool,
    /// Free-form tag attached to the call
    pub comment: Option<String>,
}

/// Parameters of a `find`
#[derive(Debug, Clone, Default)]
pub struct FindSpec {
    /// Matching condition
    pub filter: Filter,
    /// Result order
    pub sort: SortSpec,
    /// Documents to skip
    pub skip: u64,
    /// Maximum documents to return
    pub limit: Option<u64>,
    /// Field selection
    pub projection: Option<Projection>,
    /// Cursor batch size hint
    pub batch_size: Option<u32>,
}

/// Which version of a modified document to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// State before the update
    Before,
    /// State after the update
    #[default]
    After,
}

/// Parameters of an atomic find-and-update
#[derive(Debug, Clone, Default)]
pub struct FindAndModify {
    /// Matching condition
    pub filter: Filter,
    /// Picks the document when several match
    pub sort: SortSpec,
    /// Modifications
    pub update: Update,
    /// Insert when nothing matches
    pub upsert: bool,
    /// Version to return
    pub return_document: ReturnDocument,
    /// Field selection on the returned document
    pub projection: Option<Projection>,
}

/// Parameters of a `count`
#[derive(Debug, Clone, Default)]
pub struct CountSpec {
    /// Matching condition
    pub filter: Filter,
    /// Matches to skip before counting
    pub skip: u64,
    /// Stop counting after this many
    pub limit: Option<u64>,
}

/// Result of a bulk update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents matching the filter
    pub matched_count: u64,
    /// Documents actually changed
    pub modified_count: u64,
    /// Identities of the matched documents
    pub affected_ids: Vec<Value>,
    /// Identity of the inserted document, when upserting
    pub upserted_id: Option<Value>,
}

/// Result of a bulk delete
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    /// Documents removed
    pub deleted_count: u64,
    /// Identities of the removed documents
    pub deleted_ids: Vec<Value>,
}

/// One aggregation pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents matching the filter
    Match(Filter),
    /// Order documents
    Sort(SortSpec),
    /// Drop the first n documents
    Skip(u64),
    /// Keep at most n documents (n > 0)
    Limit(u64),
    /// Reshape documents
    Project(Projection),
    /// Remove paths
    Unset(Vec<String>),
    /// Assign literal values
    Set(Document),
    /// Join documents from another collection
    Lookup {
        /// Foreign collection
        from: String,
        /// Path in the input document
        local_field: String,
        /// Path in the foreign documents
        foreign_field: String,
        /// Output array path
        as_field: String,
    },
    /// Run several sub-pipelines over the same input
    Facet(Vec<(String, Vec<Stage>)>),
    /// Emit `{<field>: n}`, or nothing when the input is empty
    Count(String),
}
