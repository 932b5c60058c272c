//! Sort string decoding
//!
//! Accepted forms:
//!
//! - a single token: `-createdAt`
//! - a comma separated list: `title:asc,age:desc`
//! - a JSON array (single quotes tolerated): `["-createdAt", "name"]`
//!
//! Each token is `field:asc|desc`, `+field`, `-field` or a bare `field`
//! (ascending).

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::error::QueryError;
use super::filter::decode_json_like;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use doc_repository::query::SortDirection;
///
/// assert_eq!(format!("{}", SortDirection::Ascending), "asc");
/// assert_eq!(format!("{}", SortDirection::Descending), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl SortDirection {
    fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Ascending),
            "desc" | "descending" | "-1" => Some(Self::Descending),
            _ => None,
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dotted field path
    pub field: String,
    /// Ordering direction
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending key on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending key on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Ordered list of sort keys; the first key is the primary ordering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec(pub Vec<SortKey>);

impl SortSpec {
    /// No ordering
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// Whether any key is present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in priority order
    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    /// The only key, when exactly one was given
    pub fn single(&self) -> Option<&SortKey> {
        match self.0.as_slice() {
            [key] => Some(key),
            _ => None,
        }
    }
}

impl From<SortKey> for SortSpec {
    fn from(key: SortKey) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<SortKey>> for SortSpec {
    fn from(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", key.field, key.direction)?;
        }
        Ok(())
    }
}

impl FromStr for SortSpec {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_sort(s)
    }
}

/// Decode a sort string
///
/// Blank input yields an empty spec.
///
/// # Errors
///
/// Returns [`QueryError::BadSortFormat`] for an undecodable array, an empty
/// token or field name, or an unknown direction.
///
/// # Example
///
/// ```rust
/// use doc_repository::query::{decode_sort, SortKey};
///
/// let spec = decode_sort("title:asc,age:desc").unwrap();
/// assert_eq!(spec.keys(), &[SortKey::asc("title"), SortKey::desc("age")]);
/// assert_eq!(decode_sort("-createdAt").unwrap().single(), Some(&SortKey::desc("createdAt")));
/// ```
pub fn decode_sort(input: &str) -> Result<SortSpec, QueryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(SortSpec::none());
    }

    let tokens: Vec<String> = if trimmed.starts_with('[') {
        let decoded = decode_json_like(trimmed).map_err(|e| QueryError::bad_sort(e.to_string()))?;
        let Value::Array(items) = decoded else {
            return Err(QueryError::bad_sort("expected an array of sort tokens"));
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(QueryError::bad_sort(format!("sort token must be a string, got {other}"))),
            })
            .collect::<Result<_, _>>()?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };

    tokens
        .iter()
        .map(|token| decode_token(token))
        .collect::<Result<Vec<_>, _>>()
        .map(SortSpec)
}

fn decode_token(token: &str) -> Result<SortKey, QueryError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(QueryError::bad_sort("empty sort token"));
    }

    let (field, direction) = if let Some((field, direction)) = token.split_once(':') {
        let direction = SortDirection::parse(direction)
            .ok_or_else(|| QueryError::bad_sort(format!("unknown direction '{}'", direction.trim())))?;
        let field = field.trim();
        if field.starts_with(['+', '-']) {
            return Err(QueryError::bad_sort(format!(
                "'{token}' gives a direction both as prefix and suffix"
            )));
        }
        (field, direction)
    } else if let Some(field) = token.strip_prefix('+') {
        (field.trim(), SortDirection::Ascending)
    } else if let Some(field) = token.strip_prefix('-') {
        (field.trim(), SortDirection::Descending)
    } else {
        (token, SortDirection::Ascending)
    };

    if field.is_empty() {
        return Err(QueryError::bad_sort(format!("missing field name in '{token}'")));
    }

    Ok(SortKey {
        field: field.to_string(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_means_no_sort() {
        assert!(decode_sort("").unwrap().is_empty());
        assert!(decode_sort("  ").unwrap().is_empty());
    }

    #[test]
    fn test_prefixed_tokens() {
        assert_eq!(decode_sort("-createdAt").unwrap().single(), Some(&SortKey::desc("createdAt")));
        assert_eq!(decode_sort("+name").unwrap().single(), Some(&SortKey::asc("name")));
        assert_eq!(decode_sort("name").unwrap().single(), Some(&SortKey::asc("name")));
    }

    #[test]
    fn test_colon_list_preserves_order() {
        let spec = decode_sort("title:asc, age:DESC").unwrap();
        assert_eq!(spec.keys(), &[SortKey::asc("title"), SortKey::desc("age")]);
        assert_eq!(spec.single(), None);
        assert_eq!(spec.to_string(), "title:asc,age:desc");
    }

    #[test]
    fn test_array_form_with_single_quotes() {
        let spec = decode_sort("['-createdAt','name:asc']").unwrap();
        assert_eq!(spec.keys(), &[SortKey::desc("createdAt"), SortKey::asc("name")]);
    }

    #[test]
    fn test_malformed_inputs() {
        for input in ["[\"-a\"", "a,,b", "a:sideways", "-", ":asc", "[1]", "a,"] {
            let err = decode_sort(input).unwrap_err();
            assert!(
                matches!(err, QueryError::BadSortFormat(_)),
                "expected BadSortFormat for {input:?}"
            );
        }
    }

    #[test]
    fn test_prefix_and_suffix_together_are_rejected() {
        for input in ["-a:desc", "+a:asc", "b, -a:asc", "[\"+a:desc\"]"] {
            let err = decode_sort(input).unwrap_err();
            assert!(
                matches!(err, QueryError::BadSortFormat(_)),
                "expected BadSortFormat for {input:?}"
            );
        }
        // A suffix alone still works
        assert_eq!(decode_sort("a:desc").unwrap().keys(), &[SortKey::desc("a")]);
    }

    #[test]
    fn test_from_str() {
        let spec: SortSpec = "-a,b".parse().unwrap();
        assert_eq!(spec.keys().len(), 2);
    }
}
