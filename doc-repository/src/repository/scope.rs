//! Soft-delete scoping
//!
//! Every default-path read and write combines the caller's filter with
//! [`SoftDeleteScope::ActiveOnly`], so records carrying `isDeleted = true`
//! are invisible unless a caller opts out.

use serde::{Deserialize, Serialize};

use crate::query::Filter;

/// Which records an operation sees with respect to the soft-delete marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeleteScope {
    /// Records whose marker is not `true` (missing counts as active)
    #[default]
    ActiveOnly,
    /// Every record
    IncludeDeleted,
    /// Records whose marker is `true`
    DeletedOnly,
}

impl SoftDeleteScope {
    /// The predicate this scope adds for `field`
    pub fn predicate(self, field: &str) -> Filter {
        match self {
            Self::ActiveOnly => Filter::ne(field, true),
            Self::IncludeDeleted => Filter::All,
            Self::DeletedOnly => Filter::eq(field, true),
        }
    }

    /// Combine `filter` with this scope's predicate
    pub fn apply(self, field: &str, filter: Filter) -> Filter {
        filter.and_also(self.predicate(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_only_is_ne_true() {
        assert_eq!(
            SoftDeleteScope::ActiveOnly.predicate("isDeleted"),
            Filter::ne("isDeleted", true)
        );
        assert_eq!(SoftDeleteScope::default(), SoftDeleteScope::ActiveOnly);
    }

    #[test]
    fn test_apply_merges_with_caller_filter() {
        let scoped = SoftDeleteScope::ActiveOnly.apply("isDeleted", Filter::eq("status", "open"));
        assert_eq!(
            scoped,
            Filter::And(vec![Filter::eq("status", "open"), Filter::ne("isDeleted", true)])
        );

        let everything = SoftDeleteScope::ActiveOnly.apply("isDeleted", Filter::All);
        assert_eq!(everything, Filter::ne("isDeleted", true));
    }

    #[test]
    fn test_include_deleted_leaves_filter_untouched() {
        let filter = Filter::eq("status", "open");
        assert_eq!(
            SoftDeleteScope::IncludeDeleted.apply("isDeleted", filter.clone()),
            filter
        );
    }

    #[test]
    fn test_deleted_only() {
        assert_eq!(
            SoftDeleteScope::DeletedOnly.apply("isDeleted", Filter::All),
            Filter::eq("isDeleted", true)
        );
    }
}
