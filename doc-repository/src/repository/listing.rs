//! Paginated listing
//!
//! [`GenericRepository::get_all_data`] decodes a filter string, a sort
//! string and raw page values, enforces the field allow-list and returns one
//! page of non-deleted records plus pagination metadata. The page and the
//! total count are produced by a [`ListingStrategy`]:
//!
//! - [`SimpleQuery`] runs a paginated find and an independent count
//!   concurrently. The two reads may observe different states.
//! - [`FacetAggregation`] runs a single pipeline whose facet stage yields
//!   both the page and the count from the same input.
//!
//! The strategy is picked per call or from
//! [`RepositoryConfig::listing_mode`](crate::config::RepositoryConfig::listing_mode).
//!
//! # Example
//!
//! ```rust,ignore
//! use doc_repository::repository::GetAllParams;
//!
//! let page = notes
//!     .get_all_data(
//!         GetAllParams::new()
//!             .filter("{'and': {'title__contains': 'rust'}}")
//!             .page("2")
//!             .length("10")
//!             .filterable_fields(["title", "status"]),
//!     )
//!     .await?;
//! println!("{} of {}", page.data.len(), page.pagination.total_items);
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::generic::GenericRepository;
use super::pagination::{result_to_pagination, PaginationRequest, PaginationResult};
use super::scope::SoftDeleteScope;
use super::traits::{ManagedRecord, Record, RepositoryResult};
use crate::query::{decode_sort, ensure_filterable, parse_filter, Filter, SortSpec};
use crate::store::{
    Collation, CountSpec, Document, DocumentStore, FindSpec, IndexHint, Projection, ReadConcern,
    ReadPreference, Session, Stage, StoreOptions, StoreResult,
};

/// Fields never returned by listings
const BASELINE_EXCLUDES: [&str; 1] = ["__v"];

/// How a listing computes its page and total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// Paginated find plus a concurrent count
    #[default]
    Simple,
    /// Single facet pipeline
    Aggregation,
}

/// Everything a strategy needs to produce one page
#[derive(Debug, Clone)]
pub struct ListingPlan {
    /// Caller filter already merged with the soft-delete scope
    pub filter: Filter,
    /// Page order
    pub sort: SortSpec,
    /// Page window
    pub pagination: PaginationRequest,
    /// Paths removed from every returned document
    pub exclude: Vec<String>,
    /// Stages run before the match (aggregation only)
    pub prefix: Vec<Stage>,
    /// Reshaping applied to every returned document
    pub project: Option<Projection>,
    /// Store modifiers
    pub options: StoreOptions,
}

/// Produces a page of documents and the total match count
pub trait ListingStrategy: Send + Sync {
    /// Fetch the page described by `plan` and the total number of matches
    fn fetch<S: DocumentStore>(
        &self,
        store: &S,
        collection: &str,
        plan: &ListingPlan,
    ) -> impl Future<Output = StoreResult<(Vec<Document>, u64)>> + Send;
}

/// Paginated find and count, executed concurrently
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleQuery;

impl ListingStrategy for SimpleQuery {
    async fn fetch<S: DocumentStore>(
        &self,
        store: &S,
        collection: &str,
        plan: &ListingPlan,
    ) -> StoreResult<(Vec<Document>, u64)> {
        let find = FindSpec {
            filter: plan.filter.clone(),
            sort: plan.sort.clone(),
            skip: plan.pagination.skip(),
            limit: Some(plan.pagination.limit()),
            projection: Some(Projection::Exclude(plan.exclude.clone())),
            batch_size: None,
        };
        let count = CountSpec {
            filter: plan.filter.clone(),
            ..CountSpec::default()
        };

        let (docs, total) = futures::try_join!(
            store.find(collection, &find, &plan.options),
            store.count(collection, &count, &plan.options)
        )?;

        let docs = match &plan.project {
            Some(projection) => docs.into_iter().map(|d| projection.apply(d)).collect(),
            None => docs,
        };
        Ok((docs, total))
    }
}

/// Single pipeline: prefix, match, then a facet computing page and count
#[derive(Debug, Clone, Copy, Default)]
pub struct FacetAggregation;

impl FacetAggregation {
    /// The pipeline run for `plan`
    pub fn pipeline(plan: &ListingPlan) -> Vec<Stage> {
        let mut data = Vec::new();
        if !plan.sort.is_empty() {
            data.push(Stage::Sort(plan.sort.clone()));
        }
        data.push(Stage::Skip(plan.pagination.skip()));
        data.push(Stage::Limit(plan.pagination.limit()));
        if let Some(projection) = &plan.project {
            data.push(Stage::Project(projection.clone()));
        }
        data.push(Stage::Unset(plan.exclude.clone()));

        let mut stages = plan.prefix.clone();
        stages.push(Stage::Match(plan.filter.clone()));
        stages.push(Stage::Facet(vec![
            ("data".to_string(), data),
            (
                "totalCount".to_string(),
                vec![Stage::Count("count".to_string())],
            ),
        ]));
        stages
    }
}

impl ListingStrategy for FacetAggregation {
    async fn fetch<S: DocumentStore>(
        &self,
        store: &S,
        collection: &str,
        plan: &ListingPlan,
    ) -> StoreResult<(Vec<Document>, u64)> {
        let stages = Self::pipeline(plan);
        let mut output = store.aggregate(collection, &stages, &plan.options).await?;
        let Some(mut facets) = output.pop() else {
            return Ok((Vec::new(), 0));
        };

        let data = match facets.remove("data") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(doc) => Some(doc),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let total = facets
            .get("totalCount")
            .and_then(|branch| branch.get(0))
            .and_then(|first| first.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok((data, total))
    }
}

impl ListingStrategy for ListingMode {
    async fn fetch<S: DocumentStore>(
        &self,
        store: &S,
        collection: &str,
        plan: &ListingPlan,
    ) -> StoreResult<(Vec<Document>, u64)> {
        match self {
            Self::Simple => SimpleQuery.fetch(store, collection, plan).await,
            Self::Aggregation => FacetAggregation.fetch(store, collection, plan).await,
        }
    }
}

/// Parameters for [`GenericRepository::get_all_data`]
///
/// Raw strings are decoded by the repository; see
/// [`parse_filter`](crate::query::parse_filter) and
/// [`decode_sort`](crate::query::decode_sort) for the grammars.
#[derive(Debug, Clone, Default)]
pub struct GetAllParams {
    /// Encoded filter; blank means no filter
    pub filter: String,
    /// Encoded sort; `None` uses the configured default (`-createdAt`)
    pub sort: Option<String>,
    /// Raw page number
    pub page: Option<String>,
    /// Raw page size
    pub length: Option<String>,
    /// Fields the filter may reference; empty disables the check
    pub filterable_fields: Vec<String>,
    /// Stages run before the match (aggregation mode)
    pub aggregation_pipeline: Vec<Stage>,
    /// Reshaping applied to each returned document
    pub project_stage: Option<Projection>,
    /// Listing strategy; `None` uses the configured mode
    pub mode: Option<ListingMode>,
    /// Extra fields to strip, merged with `isDeleted` and `__v`
    pub exclude_fields: Vec<String>,
    /// Return plain documents (aggregation results are always plain)
    pub lean: Option<bool>,
    /// Session to run in
    pub session: Option<Session>,
    /// Allow pipeline stages to spill to disk
    pub allow_disk_use: bool,
    /// Execution-time ceiling
    pub max_time: Option<Duration>,
    /// Replica selection
    pub read_preference: Option<ReadPreference>,
    /// Read isolation
    pub read_concern: Option<ReadConcern>,
    /// Index to use
    pub hint: Option<IndexHint>,
    /// String comparison rules
    pub collation: Option<Collation>,
}

impl GetAllParams {
    /// Parameters with every field at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded filter
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Encoded sort
    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Raw page number
    #[must_use]
    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// Raw page size
    #[must_use]
    pub fn length(mut self, length: impl Into<String>) -> Self {
        self.length = Some(length.into());
        self
    }

    /// Allow-list of filterable fields
    #[must_use]
    pub fn filterable_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.filterable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Stages run before the match
    #[must_use]
    pub fn pipeline(mut self, stages: Vec<Stage>) -> Self {
        self.aggregation_pipeline = stages;
        self
    }

    /// Reshape each returned document
    #[must_use]
    pub fn project(mut self, projection: Projection) -> Self {
        self.project_stage = Some(projection);
        self
    }

    /// Pick the aggregation (`true`) or simple (`false`) strategy
    #[must_use]
    pub fn use_aggregation(mut self, enabled: bool) -> Self {
        self.mode = Some(if enabled {
            ListingMode::Aggregation
        } else {
            ListingMode::Simple
        });
        self
    }

    /// Pick the listing strategy
    #[must_use]
    pub fn mode(mut self, mode: ListingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Strip extra fields from returned documents
    #[must_use]
    pub fn exclude<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Choose lean or hydrated results
    #[must_use]
    pub fn lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }

    /// Run in `session`
    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Allow pipeline stages to spill to disk
    #[must_use]
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = allow;
        self
    }

    /// Execution-time ceiling
    #[must_use]
    pub fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Replica selection
    #[must_use]
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }

    /// Read isolation
    #[must_use]
    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    /// Index to use
    #[must_use]
    pub fn hint(mut self, hint: impl Into<IndexHint>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// String comparison rules
    #[must_use]
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }
}

/// One page of records with its pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<R> {
    /// Records on this page
    pub data: Vec<R>,
    /// Totals and position
    pub pagination: PaginationResult,
}

/// Baseline exclusions followed by `extra`, without duplicates
fn merged_excludes(soft_delete_field: &str, extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(extra.len() + 2);
    let baseline = std::iter::once(soft_delete_field).chain(BASELINE_EXCLUDES);
    for field in baseline.chain(extra.iter().map(String::as_str)) {
        if !merged.iter().any(|f| f == field) {
            merged.push(field.to_string());
        }
    }
    merged
}

impl<T: ManagedRecord, S: DocumentStore> GenericRepository<T, S> {
    /// One page of non-deleted records with pagination metadata
    ///
    /// Decoding and allow-list failures are returned before the store is
    /// touched.
    pub async fn get_all_data(&self, params: GetAllParams) -> RepositoryResult<Page<Record<T>>> {
        let operation = RepositoryOperation::GetAllData;

        let filter = parse_filter(&params.filter)?.into_filter();
        let sort = decode_sort(params.sort.as_deref().unwrap_or(&self.settings.default_sort))?;
        let pagination = PaginationRequest::parse_with_default(
            params.page.as_deref(),
            params.length.as_deref(),
            self.settings.default_page_size,
        )
        .capped(self.settings.max_page_size);
        ensure_filterable(&filter, &params.filterable_fields)?;

        let mode = params.mode.unwrap_or(self.settings.listing_mode);
        let lean = mode == ListingMode::Aggregation || self.resolve_lean(params.lean);
        let plan = ListingPlan {
            filter: SoftDeleteScope::ActiveOnly.apply(T::SOFT_DELETE_FIELD, filter),
            sort,
            pagination,
            exclude: merged_excludes(T::SOFT_DELETE_FIELD, &params.exclude_fields),
            prefix: params.aggregation_pipeline,
            project: params.project_stage,
            options: StoreOptions {
                session: params.session,
                max_time: params.max_time.or(self.defaults.max_time),
                hint: params.hint,
                collation: params.collation,
                read_preference: params.read_preference,
                read_concern: params.read_concern,
                allow_disk_use: params.allow_disk_use,
                comment: None,
            },
        };

        tracing::debug!(
            collection = T::COLLECTION,
            operation = %operation,
            filter = %plan.filter.summary(),
            sort = %plan.sort,
            page = plan.pagination.page,
            page_size = plan.pagination.page_size,
            mode = ?mode,
            "listing records"
        );

        let (docs, total) = mode
            .fetch(self.store.as_ref(), T::COLLECTION, &plan)
            .await
            .map_err(|e| RepositoryError::from_store(operation, e))?;

        let data = docs
            .into_iter()
            .map(|doc| Record::from_document(doc, lean, operation))
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok(Page {
            data,
            pagination: result_to_pagination(total, &plan.pagination),
        })
    }
}
