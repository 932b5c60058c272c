//! Typed filter values and value normalization
//!
//! Raw values decoded from a filter string are JSON. Before a condition is
//! built, the value is normalized according to its operator: date operators
//! turn date strings into instants, `"true"`/`"false"` become booleans and
//! numeric-looking strings become numbers (except for substring operators).
//!
//! # Example
//!
//! ```rust
//! use doc_repository::query::FilterValue;
//!
//! let string_val: FilterValue = "active".into();
//! let int_val: FilterValue = 42_i64.into();
//! let bool_val: FilterValue = true.into();
//! assert_eq!(int_val, FilterValue::Number(42.0));
//! ```

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::filter::Operator;

/// A value that can be compared against document fields
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// JSON null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Numeric value (JSON numbers are compared as `f64`)
    Number(f64),
    /// String value
    String(String),
    /// Point in time, compared against RFC 3339 strings or epoch milliseconds
    Date(DateTime<Utc>),
    /// List of values
    List(Vec<FilterValue>),
    /// Structured JSON value (objects)
    Json(Value),
}

impl FilterValue {
    /// Convert back into JSON, rendering dates as RFC 3339 with milliseconds
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(format_date(d)),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Borrow the inner date, if this is a date value
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            object @ Value::Object(_) => Self::Json(object),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(list: Vec<T>) -> Self {
        Self::List(list.into_iter().map(Into::into).collect())
    }
}

/// Normalize a raw decoded value for the given operator.
///
/// Date coercion only happens for date operators; the caller handles the
/// range expansion for `day`/`month`/`year`.
pub(crate) fn normalize(value: &Value, operator: Operator) -> FilterValue {
    if let Value::String(s) = value {
        if operator.is_date_operator() {
            if let Some(date) = parse_datetime(s) {
                return FilterValue::Date(date);
            }
        }

        let lowered = s.to_ascii_lowercase();
        if lowered == "true" || lowered == "false" {
            return FilterValue::Boolean(lowered == "true");
        }

        if !matches!(operator, Operator::Like | Operator::Ilike) {
            if let Some(n) = parse_numeric(s) {
                return FilterValue::Number(n);
            }
        }
    }
    FilterValue::from(value.clone())
}

/// Parse a numeric-looking string; blank and non-finite inputs are rejected
pub(crate) fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a date or date-time string into a UTC instant.
///
/// Accepts RFC 3339, naive date-times (interpreted as UTC), plain dates
/// and year-month strings.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(start_of_day(date));
        }
    }
    // "2025-03" (year-month)
    NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .ok()
        .map(start_of_day)
}

/// `00:00:00.000` of the given day
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_milli_opt(0, 0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// `23:59:59.999` of the given day
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Inclusive bounds of the calendar day containing `date`
pub fn day_bounds(date: &DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = date.date_naive();
    (start_of_day(day), end_of_day(day))
}

/// Inclusive bounds of the calendar month containing `date`
pub fn month_bounds(date: &DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = date.date_naive();
    let first = NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap_or(day);
    let next_month = if day.month() == 12 {
        NaiveDate::from_ymd_opt(day.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(day);
    (start_of_day(first), end_of_day(last))
}

/// Inclusive bounds of the calendar year containing `date`
pub fn year_bounds(date: &DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let year = date.year();
    let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_else(|| date.date_naive());
    let last = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or_else(|| date.date_naive());
    (start_of_day(first), end_of_day(last))
}

/// Render an instant the way documents store it
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
