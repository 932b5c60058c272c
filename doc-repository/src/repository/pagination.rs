//! Pagination windows and result metadata
//!
//! Page and page-size arrive as raw query-string values and are parsed
//! leniently: leading digits are taken, anything unusable falls back to the
//! defaults. There is no error path.
//!
//! # Example
//!
//! ```rust
//! use doc_repository::repository::{query_to_pagination, result_to_pagination};
//!
//! let request = query_to_pagination(Some("2"), Some("10"));
//! assert_eq!(request.skip(), 10);
//! assert_eq!(request.limit(), 10);
//!
//! let result = result_to_pagination(25, &request);
//! assert_eq!(result.total_pages, 3);
//! assert_eq!(result.current_page, 2);
//! ```

use serde::{Deserialize, Serialize};

/// Page size used when none (or an unusable one) is supplied
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A requested page, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationRequest {
    /// Page number, at least 1
    pub page: u64,
    /// Items per page, at least 1
    pub page_size: u64,
}

impl Default for PaginationRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationRequest {
    /// Create a request; zero values fall back to the defaults
    #[must_use]
    pub const fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: if page == 0 { 1 } else { page },
            page_size: if page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                page_size
            },
        }
    }

    /// Parse raw page and length values with the default page size
    pub fn parse(page: Option<&str>, length: Option<&str>) -> Self {
        Self::parse_with_default(page, length, DEFAULT_PAGE_SIZE)
    }

    /// Parse raw page and length values, falling back to `default_size`
    pub fn parse_with_default(page: Option<&str>, length: Option<&str>, default_size: u64) -> Self {
        let default_size = default_size.max(1);
        Self {
            page: page.and_then(parse_positive).unwrap_or(1),
            page_size: length.and_then(parse_positive).unwrap_or(default_size),
        }
    }

    /// Clamp the page size to `max`, when a cap is configured
    #[must_use]
    pub fn capped(self, max: Option<u64>) -> Self {
        match max {
            Some(max) if max > 0 && self.page_size > max => {
                tracing::warn!(requested = self.page_size, max, "page size capped");
                Self {
                    page_size: max,
                    ..self
                }
            }
            _ => self,
        }
    }

    /// Number of items before this page
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Maximum number of items on this page
    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

/// Leading-digit integer parse; zero, negative and non-numeric give `None`
fn parse_positive(raw: &str) -> Option<u64> {
    let trimmed = raw.trim_start();
    let digits = match trimmed.as_bytes().first() {
        Some(b'-') => return None,
        Some(b'+') => &trimmed[1..],
        _ => trimmed,
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    match digits[..end].parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

/// Pagination metadata returned alongside a page of data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    /// Matching items across all pages
    pub total_items: u64,
    /// `ceil(total_items / page_size)`
    pub total_pages: u64,
    /// 1-indexed page this result describes
    pub current_page: u64,
    /// Items per page
    pub page_size: u64,
}

/// Parse raw `page` and `length` query values
pub fn query_to_pagination(page: Option<&str>, length: Option<&str>) -> PaginationRequest {
    PaginationRequest::parse(page, length)
}

/// Pagination metadata for `total_items` matches under `request`
pub fn result_to_pagination(total_items: u64, request: &PaginationRequest) -> PaginationResult {
    let limit = request.limit().max(1);
    PaginationResult {
        total_items,
        total_pages: total_items.div_ceil(limit),
        current_page: request.skip() / limit + 1,
        page_size: limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let request = query_to_pagination(None, None);
        assert_eq!(request, PaginationRequest::new(1, 10));
        assert_eq!(request.skip(), 0);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn test_lenient_parse() {
        assert_eq!(query_to_pagination(Some("3abc"), Some(" 20 ")).page, 3);
        assert_eq!(query_to_pagination(Some("3abc"), Some(" 20 ")).page_size, 20);
        assert_eq!(query_to_pagination(Some("2.9"), None).page, 2);
        assert_eq!(query_to_pagination(Some("+4"), None).page, 4);
    }

    #[test]
    fn test_unusable_values_fall_back() {
        for raw in ["abc", "", "0", "-3", "-0", "x1"] {
            let request = query_to_pagination(Some(raw), Some(raw));
            assert_eq!(request, PaginationRequest::default(), "input {raw:?}");
        }
    }

    #[test]
    fn test_skip_round_trips_current_page() {
        for page in 1..=7 {
            for size in [1, 5, 10, 33] {
                let request = PaginationRequest::new(page, size);
                assert_eq!(request.skip(), (page - 1) * size);
                assert_eq!(result_to_pagination(0, &request).current_page, page);
            }
        }
    }

    #[test]
    fn test_total_pages_ceiling() {
        let request = PaginationRequest::new(1, 10);
        assert_eq!(result_to_pagination(0, &request).total_pages, 0);
        assert_eq!(result_to_pagination(1, &request).total_pages, 1);
        assert_eq!(result_to_pagination(10, &request).total_pages, 1);
        assert_eq!(result_to_pagination(11, &request).total_pages, 2);
        assert_eq!(result_to_pagination(25, &request).total_pages, 3);
    }

    #[test]
    fn test_custom_default_and_cap() {
        let request = PaginationRequest::parse_with_default(None, None, 25);
        assert_eq!(request.page_size, 25);

        let capped = PaginationRequest::new(2, 500).capped(Some(100));
        assert_eq!(capped.page_size, 100);
        assert_eq!(capped.skip(), 100);
        assert_eq!(PaginationRequest::new(1, 50).capped(None).page_size, 50);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = result_to_pagination(25, &PaginationRequest::new(2, 10));
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"totalItems": 25, "totalPages": 3, "currentPage": 2, "pageSize": 10})
        );
    }
}
