//! Errors raised while decoding caller-supplied query strings
//!
//! These are produced synchronously, before any store interaction, and are
//! converted into [`RepositoryError`](crate::repository::RepositoryError)
//! values by the repository layer.

use thiserror::Error;

/// Failure to decode a filter or sort string, or an allow-list violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The filter string could not be decoded, or an operator received a
    /// value of the wrong shape (e.g. `between` without two bounds)
    #[error("Invalid filter format: {0}")]
    InvalidFilterFormat(String),

    /// One or more filtered fields are not in the caller's allow-list
    #[error("{}", describe_non_filterable(.fields))]
    NonFilterableField {
        /// Offending fields in first-seen order
        fields: Vec<String>,
    },

    /// The sort string could not be decoded
    #[error("Bad sort format: {0}")]
    BadSortFormat(String),
}

impl QueryError {
    pub(crate) fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilterFormat(message.into())
    }

    pub(crate) fn bad_sort(message: impl Into<String>) -> Self {
        Self::BadSortFormat(message.into())
    }
}

fn describe_non_filterable(fields: &[String]) -> String {
    match fields {
        [single] => format!("Field is not filterable: {single}"),
        many => format!("Fields are not filterable: {}", many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_non_filterable_message() {
        let error = QueryError::NonFilterableField {
            fields: vec!["secret".to_string()],
        };
        assert_eq!(error.to_string(), "Field is not filterable: secret");
    }

    #[test]
    fn test_multiple_non_filterable_message() {
        let error = QueryError::NonFilterableField {
            fields: vec!["secret".to_string(), "owner".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Fields are not filterable: secret, owner"
        );
    }

    #[test]
    fn test_invalid_filter_message_carries_reason() {
        let error = QueryError::invalid_filter("expected value at line 1 column 2");
        assert!(error.to_string().starts_with("Invalid filter format:"));
        assert!(error.to_string().contains("line 1 column 2"));
    }
}
