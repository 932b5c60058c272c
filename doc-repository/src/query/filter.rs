//! Filter DSL parsing and the structured filter tree
//!
//! A filter string is a JSON-like object (single quotes are tolerated) with
//! up to three groups:
//!
//! ```text
//! {"and": {"<field>[__<op>]": value, ...}, "or": [{...}, ...], "not": {...}}
//! ```
//!
//! Each key is split on the first `__` into a field path and an operator.
//! Keys without a suffix use equality, and unknown suffixes fall back to it.
//!
//! # Example
//!
//! ```rust
//! use doc_repository::query::{parse_filter, Operator};
//!
//! let expr = parse_filter(r#"{"and":{"age__between":[18,65],"status":"active"}}"#).unwrap();
//! assert_eq!(expr.and.len(), 2);
//! assert_eq!(expr.and[0].operator, Operator::Between);
//! ```

use std::fmt;

use serde_json::{Map, Value};

use super::error::QueryError;
use super::value::{self, FilterValue};

/// Operators accepted as `__<op>` key suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equality (default)
    Eq,
    /// Inequality (`ne`, `neq`)
    Ne,
    /// Value is one of a list
    In,
    /// Value is none of a list (`nin`, `notIn`)
    NotIn,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Inclusive `[min, max]` range
    Between,
    /// Case-insensitive substring
    Like,
    /// Case-insensitive substring
    Contains,
    /// Case-insensitive substring
    Ilike,
    /// Case-insensitive prefix
    StartsWith,
    /// Case-insensitive suffix
    EndsWith,
    /// Case-insensitive substring must be absent
    NotContains,
    /// Case-sensitive substring
    ExactContains,
    /// Case-sensitive prefix
    ExactStartsWith,
    /// Case-sensitive suffix
    ExactEndsWith,
    /// Regular expression match
    Regex,
    /// Case-insensitive text search
    Search,
    /// Field is null or missing
    IsNull,
    /// Field is present and not null
    IsNotNull,
    /// Field is `true`
    IsTrue,
    /// Field is `false`
    IsFalse,
    /// Array contains the value
    Has,
    /// Array contains at least one of the values
    HasSome,
    /// Array contains all of the values
    HasEvery,
    /// Array is empty
    IsEmpty,
    /// Same calendar day
    Day,
    /// Same calendar month
    Month,
    /// Same calendar year
    Year,
    /// Strictly before
    Before,
    /// Strictly after
    After,
    /// Inclusive date range, upper bound extended to the end of its day
    DateRange,
    /// Structured value contains the given JSON
    JsonContains,
    /// Object has the given key
    JsonHas,
}

impl Operator {
    /// Look up an operator by its key suffix
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let op = match suffix {
            "eq" => Self::Eq,
            "ne" | "neq" => Self::Ne,
            "in" => Self::In,
            "nin" | "notIn" => Self::NotIn,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "between" => Self::Between,
            "like" => Self::Like,
            "contains" => Self::Contains,
            "ilike" => Self::Ilike,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "notContains" => Self::NotContains,
            "exactContains" => Self::ExactContains,
            "exactStartsWith" => Self::ExactStartsWith,
            "exactEndsWith" => Self::ExactEndsWith,
            "regex" => Self::Regex,
            "search" => Self::Search,
            "isNull" => Self::IsNull,
            "isNotNull" => Self::IsNotNull,
            "isTrue" => Self::IsTrue,
            "isFalse" => Self::IsFalse,
            "has" => Self::Has,
            "hasSome" => Self::HasSome,
            "hasEvery" => Self::HasEvery,
            "isEmpty" => Self::IsEmpty,
            "day" => Self::Day,
            "month" => Self::Month,
            "year" => Self::Year,
            "before" => Self::Before,
            "after" => Self::After,
            "dateRange" => Self::DateRange,
            "jsonContains" => Self::JsonContains,
            "jsonHas" => Self::JsonHas,
            _ => return None,
        };
        Some(op)
    }

    /// Canonical suffix for this operator
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::Like => "like",
            Self::Contains => "contains",
            Self::Ilike => "ilike",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::NotContains => "notContains",
            Self::ExactContains => "exactContains",
            Self::ExactStartsWith => "exactStartsWith",
            Self::ExactEndsWith => "exactEndsWith",
            Self::Regex => "regex",
            Self::Search => "search",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
            Self::IsTrue => "isTrue",
            Self::IsFalse => "isFalse",
            Self::Has => "has",
            Self::HasSome => "hasSome",
            Self::HasEvery => "hasEvery",
            Self::IsEmpty => "isEmpty",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
            Self::Before => "before",
            Self::After => "after",
            Self::DateRange => "dateRange",
            Self::JsonContains => "jsonContains",
            Self::JsonHas => "jsonHas",
        }
    }

    /// Whether values for this operator are interpreted as dates
    pub const fn is_date_operator(&self) -> bool {
        matches!(
            self,
            Self::Day | Self::Month | Self::Year | Self::Before | Self::After | Self::DateRange
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a text needle must appear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// Anywhere in the value
    Contains,
    /// At the start
    StartsWith,
    /// At the end
    EndsWith,
}

/// A compiled regular expression
#[derive(Debug, Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    /// Compile a pattern, reporting syntax errors as filter errors
    pub fn new(pattern: &str) -> Result<Self, QueryError> {
        regex::Regex::new(pattern)
            .map(Self)
            .map_err(|e| QueryError::invalid_filter(format!("invalid regex '{pattern}': {e}")))
    }

    /// Test a string against the pattern
    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// The typed test a condition applies to a field
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value
    Eq(FilterValue),
    /// Field does not equal the value (missing fields match)
    Ne(FilterValue),
    /// Field equals one of the values
    In(Vec<FilterValue>),
    /// Field equals none of the values
    NotIn(Vec<FilterValue>),
    /// Field is greater than the value
    Gt(FilterValue),
    /// Field is greater than or equal to the value
    Gte(FilterValue),
    /// Field is less than the value
    Lt(FilterValue),
    /// Field is less than or equal to the value
    Lte(FilterValue),
    /// `lower <= field <= upper`
    Range {
        /// Inclusive lower bound
        lower: FilterValue,
        /// Inclusive upper bound
        upper: FilterValue,
    },
    /// Substring, prefix or suffix match
    Text {
        /// Text to look for
        needle: String,
        /// Where the needle must appear
        mode: TextMatch,
        /// Compare case-sensitively
        case_sensitive: bool,
    },
    /// Case-insensitive substring must not appear
    Excludes {
        /// Text that must be absent
        needle: String,
    },
    /// Regular expression match
    Regex(Pattern),
    /// Field is null or missing
    IsNull,
    /// Field is present and not null
    IsNotNull,
    /// Field is `true`
    IsTrue,
    /// Field is `false`
    IsFalse,
    /// Array field contains the value
    Has(FilterValue),
    /// Array field contains at least one value
    HasSome(Vec<FilterValue>),
    /// Array field contains every value
    HasEvery(Vec<FilterValue>),
    /// Array field is empty
    IsEmpty,
    /// Field contains the JSON structure
    JsonContains(Value),
    /// Object field has the key
    JsonHas(String),
}

/// A single `field operator value` test
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Dotted field path
    pub field: String,
    /// Operator as written by the caller
    pub operator: Operator,
    /// Compiled predicate
    pub predicate: Predicate,
}

impl Condition {
    /// Create a condition from its parts
    pub fn new(field: impl Into<String>, operator: Operator, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            operator,
            predicate,
        }
    }
}

/// Structured filter tree consumed by document stores
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document
    #[default]
    All,
    /// Single condition
    Condition(Condition),
    /// All children match
    And(Vec<Filter>),
    /// At least one child matches
    Or(Vec<Filter>),
    /// No child matches
    Not(Vec<Filter>),
}

impl Filter {
    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Condition(Condition::new(field, Operator::Eq, Predicate::Eq(value.into())))
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Condition(Condition::new(field, Operator::Ne, Predicate::Ne(value.into())))
    }

    /// `field` is one of `values`
    pub fn is_in(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self::Condition(Condition::new(field, Operator::In, Predicate::In(values)))
    }

    /// Conjunction of filters, dropping match-all members
    pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut members: Vec<Filter> = filters.into_iter().filter(|f| !f.is_all()).collect();
        match members.len() {
            0 => Self::All,
            1 => members.remove(0),
            _ => Self::And(members),
        }
    }

    /// Combine with another filter; both must match
    #[must_use]
    pub fn and_also(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, other) => other,
            (this, Self::All) => this,
            (Self::And(mut members), other) => {
                members.push(other);
                Self::And(members)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    /// Whether the filter matches everything
    pub fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::And(members) => members.iter().all(Self::is_all),
            _ => false,
        }
    }

    /// Leaf conditions in depth-first order
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::All => {}
            Self::Condition(c) => out.push(c),
            Self::And(members) | Self::Or(members) | Self::Not(members) => {
                for member in members {
                    member.collect_conditions(out);
                }
            }
        }
    }

    /// Short human-readable rendering used in log events
    pub fn summary(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Condition(c) => format!("{}__{}", c.field, c.operator),
            Self::And(m) => format!("and({})", join_summaries(m)),
            Self::Or(m) => format!("or({})", join_summaries(m)),
            Self::Not(m) => format!("not({})", join_summaries(m)),
        }
    }
}

fn join_summaries(members: &[Filter]) -> String {
    members.iter().map(Filter::summary).collect::<Vec<_>>().join(",")
}

/// A decoded filter string: the three top-level groups
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpression {
    /// Conditions that must all match
    pub and: Vec<Condition>,
    /// Conditions of which at least one must match
    pub or: Vec<Condition>,
    /// Conditions of which none may match
    pub not: Vec<Condition>,
}

impl FilterExpression {
    /// True when no group carries a condition
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty() && self.not.is_empty()
    }

    /// Every condition across the groups, in `and`, `or`, `not` order
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.and.iter().chain(self.or.iter()).chain(self.not.iter())
    }

    /// Compile into a [`Filter`] tree
    pub fn into_filter(self) -> Filter {
        let wrap = |conditions: Vec<Condition>| -> Vec<Filter> {
            conditions.into_iter().map(Filter::Condition).collect()
        };

        let mut groups = Vec::with_capacity(3);
        if !self.and.is_empty() {
            groups.push(Filter::And(wrap(self.and)));
        }
        if !self.or.is_empty() {
            groups.push(Filter::Or(wrap(self.or)));
        }
        if !self.not.is_empty() {
            groups.push(Filter::Not(wrap(self.not)));
        }
        Filter::all_of(groups)
    }
}

/// Decode JSON, retrying with single quotes swapped for double quotes
pub(crate) fn decode_json_like(input: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(input).or_else(|strict_err| {
        if input.contains('\'') {
            serde_json::from_str(&input.replace('\'', "\""))
        } else {
            Err(strict_err)
        }
    })
}

/// Parse a filter string into a [`FilterExpression`]
///
/// # Errors
///
/// Returns [`QueryError::InvalidFilterFormat`] when the string cannot be
/// decoded, a group has the wrong shape, or an operator receives a value it
/// cannot use.
pub fn parse_filter(input: &str) -> Result<FilterExpression, QueryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        return Ok(FilterExpression::default());
    }

    let decoded = decode_json_like(trimmed).map_err(|e| QueryError::invalid_filter(e.to_string()))?;
    let Value::Object(root) = decoded else {
        return Err(QueryError::invalid_filter("filter must be a JSON object"));
    };

    let mut expression = FilterExpression::default();
    for (group, body) in &root {
        let target = match group.as_str() {
            "and" => &mut expression.and,
            "or" => &mut expression.or,
            "not" => &mut expression.not,
            other => {
                tracing::warn!(group = %other, "ignoring unknown filter group");
                continue;
            }
        };
        build_group(body, target)?;
    }

    Ok(expression)
}

fn build_group(body: &Value, out: &mut Vec<Condition>) -> Result<(), QueryError> {
    match body {
        Value::Null => Ok(()),
        Value::Object(entries) => build_entries(entries, out),
        Value::Array(items) => {
            for item in items {
                let Value::Object(entries) = item else {
                    return Err(QueryError::invalid_filter(
                        "group array items must be objects",
                    ));
                };
                build_entries(entries, out)?;
            }
            Ok(())
        }
        _ => Err(QueryError::invalid_filter(
            "filter group must be an object or an array of objects",
        )),
    }
}

fn build_entries(entries: &Map<String, Value>, out: &mut Vec<Condition>) -> Result<(), QueryError> {
    for (key, raw) in entries {
        let (field, suffix) = split_key(key);
        if field.is_empty() {
            return Err(QueryError::invalid_filter(format!(
                "missing field name in key '{key}'"
            )));
        }
        let operator = match suffix {
            None => Operator::Eq,
            Some(s) => Operator::from_suffix(s).unwrap_or_else(|| {
                tracing::warn!(field = %field, operator = %s, "unknown filter operator, using equality");
                Operator::Eq
            }),
        };
        out.push(build_condition(field, operator, raw)?);
    }
    Ok(())
}

/// Split `field__op` on the first `__`
fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once("__") {
        Some((field, rest)) => {
            let op = rest.split("__").next().unwrap_or(rest);
            (field, Some(op))
        }
        None => (key, None),
    }
}

fn build_condition(field: &str, operator: Operator, raw: &Value) -> Result<Condition, QueryError> {
    use Operator as Op;

    let predicate = match operator {
        Op::Eq => Predicate::Eq(value::normalize(raw, operator)),
        Op::Ne => Predicate::Ne(value::normalize(raw, operator)),
        Op::In => Predicate::In(raw_list(raw)),
        Op::NotIn => Predicate::NotIn(raw_list(raw)),
        Op::Gt => Predicate::Gt(value::normalize(raw, operator)),
        Op::Gte => Predicate::Gte(value::normalize(raw, operator)),
        Op::Lt => Predicate::Lt(value::normalize(raw, operator)),
        Op::Lte => Predicate::Lte(value::normalize(raw, operator)),
        Op::Between => {
            let (low, high) = pair(raw, operator, "[min, max]")?;
            Predicate::Range {
                lower: value::normalize(low, Op::Gte),
                upper: value::normalize(high, Op::Lte),
            }
        }
        Op::Like | Op::Contains | Op::Ilike | Op::Search => {
            text(raw, operator, TextMatch::Contains, false)?
        }
        Op::StartsWith => text(raw, operator, TextMatch::StartsWith, false)?,
        Op::EndsWith => text(raw, operator, TextMatch::EndsWith, false)?,
        Op::ExactContains => text(raw, operator, TextMatch::Contains, true)?,
        Op::ExactStartsWith => text(raw, operator, TextMatch::StartsWith, true)?,
        Op::ExactEndsWith => text(raw, operator, TextMatch::EndsWith, true)?,
        Op::NotContains => Predicate::Excludes {
            needle: text_value(raw, operator)?,
        },
        Op::Regex => Predicate::Regex(Pattern::new(&text_value(raw, operator)?)?),
        Op::IsNull => Predicate::IsNull,
        Op::IsNotNull => Predicate::IsNotNull,
        Op::IsTrue => Predicate::IsTrue,
        Op::IsFalse => Predicate::IsFalse,
        Op::Has => Predicate::Has(FilterValue::from(raw.clone())),
        Op::HasSome => Predicate::HasSome(raw_list(raw)),
        Op::HasEvery => Predicate::HasEvery(raw_list(raw)),
        Op::IsEmpty => Predicate::IsEmpty,
        Op::Day | Op::Month | Op::Year => {
            let date = date_value(raw, operator)?;
            let (lower, upper) = match operator {
                Op::Day => value::day_bounds(&date),
                Op::Month => value::month_bounds(&date),
                _ => value::year_bounds(&date),
            };
            Predicate::Range {
                lower: FilterValue::Date(lower),
                upper: FilterValue::Date(upper),
            }
        }
        Op::Before => Predicate::Lt(FilterValue::Date(date_value(raw, operator)?)),
        Op::After => Predicate::Gt(FilterValue::Date(date_value(raw, operator)?)),
        Op::DateRange => {
            let (start, end) = pair(raw, operator, "[startDate, endDate]")?;
            let start = date_value(start, operator)?;
            let end = date_value(end, operator)?;
            Predicate::Range {
                lower: FilterValue::Date(start),
                upper: FilterValue::Date(value::end_of_day(end.date_naive())),
            }
        }
        Op::JsonContains => Predicate::JsonContains(raw.clone()),
        Op::JsonHas => Predicate::JsonHas(text_value(raw, operator)?),
    };

    Ok(Condition::new(field, operator, predicate))
}

fn raw_list(raw: &Value) -> Vec<FilterValue> {
    match raw {
        Value::Array(items) => items.iter().cloned().map(FilterValue::from).collect(),
        scalar => vec![FilterValue::from(scalar.clone())],
    }
}

fn pair<'a>(raw: &'a Value, operator: Operator, shape: &str) -> Result<(&'a Value, &'a Value), QueryError> {
    match raw {
        Value::Array(items) if items.len() == 2 => Ok((&items[0], &items[1])),
        _ => Err(QueryError::invalid_filter(format!(
            "'{operator}' operator requires array with 2 values: {shape}"
        ))),
    }
}

fn text(raw: &Value, operator: Operator, mode: TextMatch, case_sensitive: bool) -> Result<Predicate, QueryError> {
    Ok(Predicate::Text {
        needle: text_value(raw, operator)?,
        mode,
        case_sensitive,
    })
}

fn text_value(raw: &Value, operator: Operator) -> Result<String, QueryError> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(QueryError::invalid_filter(format!(
            "'{operator}' operator requires a string value"
        ))),
    }
}

fn date_value(raw: &Value, operator: Operator) -> Result<chrono::DateTime<chrono::Utc>, QueryError> {
    match value::normalize(raw, operator) {
        FilterValue::Date(date) => Ok(date),
        _ => Err(QueryError::invalid_filter(format!(
            "'{operator}' operator requires a valid date, got {raw}"
        ))),
    }
}
