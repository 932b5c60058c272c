//! Pull a single field's value out of a raw filter string
//!
//! Services use this to read an embedded identifier (for example a tenant or
//! business id) from an arbitrary caller filter before running auxiliary
//! checks. The search is depth-first and stops at the first match.

use serde_json::Value;

use super::error::QueryError;
use super::filter::decode_json_like;

/// Find the value bound to `field` anywhere in a filter string
///
/// A key matches when it is the field itself, carries an operator suffix
/// (`field__op`), or ends with the field as the last path segment
/// (`a.b.field`, `a.b.field__op`). Arrays are searched element by element.
///
/// # Errors
///
/// Returns [`QueryError::InvalidFilterFormat`] if the filter cannot be decoded.
///
/// # Example
///
/// ```rust
/// use doc_repository::query::extract_field_value;
/// use serde_json::json;
///
/// let filter = r#"{"and":{"roles.businessId__eq":"b-1","status":"active"}}"#;
/// let value = extract_field_value(filter, "businessId").unwrap();
/// assert_eq!(value, Some(json!("b-1")));
/// ```
pub fn extract_field_value(filter: &str, field: &str) -> Result<Option<Value>, QueryError> {
    let trimmed = filter.trim();
    if trimmed.is_empty() || field.is_empty() {
        return Ok(None);
    }
    let decoded = decode_json_like(trimmed).map_err(|e| QueryError::invalid_filter(e.to_string()))?;
    Ok(find_value(&decoded, field).cloned())
}

fn find_value<'a>(node: &'a Value, field: &str) -> Option<&'a Value> {
    match node {
        Value::Array(items) => items.iter().find_map(|item| find_value(item, field)),
        Value::Object(entries) => entries.iter().find_map(|(key, value)| {
            if key_binds_field(key, field) {
                Some(value)
            } else {
                find_value(value, field)
            }
        }),
        _ => None,
    }
}

fn key_binds_field(key: &str, field: &str) -> bool {
    let path = key.split_once("__").map_or(key, |(path, _)| path);
    path == field
        || path
            .strip_suffix(field)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_key() {
        let value = extract_field_value(r#"{"and":{"businessId":"b-1"}}"#, "businessId").unwrap();
        assert_eq!(value, Some(json!("b-1")));
    }

    #[test]
    fn test_operator_suffixed_key() {
        let value = extract_field_value(r#"{"and":{"businessId__like":"b-"}}"#, "businessId").unwrap();
        assert_eq!(value, Some(json!("b-")));
    }

    #[test]
    fn test_dotted_suffix_inside_or_array() {
        let filter = r#"{"or":[{"status":"x"},{"roles.businessRoles.businessId__eq":"b-9"}]}"#;
        let value = extract_field_value(filter, "businessId").unwrap();
        assert_eq!(value, Some(json!("b-9")));
    }

    #[test]
    fn test_first_match_wins() {
        let filter = r#"{"and":{"businessId":"first"},"or":[{"businessId":"second"}]}"#;
        let value = extract_field_value(filter, "businessId").unwrap();
        assert_eq!(value, Some(json!("first")));
    }

    #[test]
    fn test_partial_names_do_not_match() {
        let filter = r#"{"and":{"subbusinessId":"x","businessIdentity":"y"}}"#;
        assert_eq!(extract_field_value(filter, "businessId").unwrap(), None);
    }

    #[test]
    fn test_missing_and_empty() {
        assert_eq!(extract_field_value("", "businessId").unwrap(), None);
        assert_eq!(extract_field_value(r#"{"and":{"a":1}}"#, "businessId").unwrap(), None);
    }

    #[test]
    fn test_single_quotes_and_errors() {
        let value = extract_field_value("{'and':{'businessId':'b'}}", "businessId").unwrap();
        assert_eq!(value, Some(json!("b")));
        assert!(extract_field_value("{oops", "businessId").is_err());
    }
}
