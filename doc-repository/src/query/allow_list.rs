//! Per-endpoint filterable field allow-lists

use super::error::QueryError;
use super::filter::Filter;

/// Fields referenced by `filter` that are not in `allowed`
///
/// Deduplicated, in first-seen order. An empty allow-list permits every field.
pub fn non_filterable_fields<S: AsRef<str>>(filter: &Filter, allowed: &[S]) -> Vec<String> {
    if allowed.is_empty() {
        return Vec::new();
    }

    let mut offending: Vec<String> = Vec::new();
    for condition in filter.conditions() {
        let field = condition.field.as_str();
        let permitted = allowed.iter().any(|a| a.as_ref() == field);
        if !permitted && !offending.iter().any(|f| f == field) {
            offending.push(field.to_string());
        }
    }
    offending
}

/// Reject filters that reference fields outside the allow-list
///
/// # Errors
///
/// Returns [`QueryError::NonFilterableField`] naming every offending field.
///
/// # Example
///
/// ```rust
/// use doc_repository::query::{ensure_filterable, parse_filter};
///
/// let filter = parse_filter(r#"{"and":{"secret__eq":"x"}}"#).unwrap().into_filter();
/// let err = ensure_filterable(&filter, &["title"]).unwrap_err();
/// assert_eq!(err.to_string(), "Field is not filterable: secret");
/// ```
pub fn ensure_filterable<S: AsRef<str>>(filter: &Filter, allowed: &[S]) -> Result<(), QueryError> {
    let fields = non_filterable_fields(filter, allowed);
    if fields.is_empty() {
        Ok(())
    } else {
        Err(QueryError::NonFilterableField { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_filter;

    fn compile(input: &str) -> Filter {
        parse_filter(input).unwrap().into_filter()
    }

    #[test]
    fn test_empty_allow_list_disables_check() {
        let filter = compile(r#"{"and":{"anything":1}}"#);
        let allowed: [&str; 0] = [];
        assert!(ensure_filterable(&filter, &allowed).is_ok());
    }

    #[test]
    fn test_permitted_fields_pass() {
        let filter = compile(r#"{"and":{"title__like":"a"},"or":[{"title":"b"}]}"#);
        assert!(ensure_filterable(&filter, &["title"]).is_ok());
    }

    #[test]
    fn test_violations_across_groups_are_deduplicated() {
        let filter = compile(
            r#"{"and":{"secret":"x","title":"t"},"or":[{"owner":"o"},{"secret__ne":"y"}],"not":{"owner":"z"}}"#,
        );
        assert_eq!(non_filterable_fields(&filter, &["title"]), vec!["secret", "owner"]);

        let err = ensure_filterable(&filter, &["title"]).unwrap_err();
        assert_eq!(err.to_string(), "Fields are not filterable: secret, owner");
    }

    #[test]
    fn test_nested_paths_must_match_exactly() {
        let filter = compile(r#"{"and":{"author.name":"x"}}"#);
        assert!(ensure_filterable(&filter, &["author.name"]).is_ok());
        assert!(ensure_filterable(&filter, &["author"]).is_err());
    }
}
