//! Filter evaluation and ordering over JSON documents
//!
//! Field paths resolve through nested objects and arrays. A condition holds
//! when any resolved value satisfies it, and for scalar predicates array
//! values are searched element by element. Dates are stored as RFC 3339
//! strings (or epoch milliseconds) and compared as instants whenever the
//! condition carries a date.

use std::cmp::Ordering;

use serde_json::Value;

use super::path;
use super::types::{Collation, Document};
use crate::query::{parse_datetime, Condition, Filter, FilterValue, Predicate, SortDirection, SortSpec, TextMatch};

/// Whether `doc` satisfies `filter`
pub(crate) fn matches(filter: &Filter, doc: &Document, collation: Option<&Collation>) -> bool {
    match filter {
        Filter::All => true,
        Filter::Condition(condition) => matches_condition(condition, doc, collation),
        Filter::And(members) => members.iter().all(|m| matches(m, doc, collation)),
        Filter::Or(members) => members.iter().any(|m| matches(m, doc, collation)),
        Filter::Not(members) => !members.iter().any(|m| matches(m, doc, collation)),
    }
}

fn matches_condition(condition: &Condition, doc: &Document, collation: Option<&Collation>) -> bool {
    let values = path::resolve(doc, &condition.field);
    let ignore_case = collation.is_some_and(Collation::ignores_case);

    match &condition.predicate {
        Predicate::Eq(wanted) => any_equal(&values, wanted, ignore_case),
        Predicate::Ne(wanted) => !any_equal(&values, wanted, ignore_case),
        Predicate::In(list) => list.iter().any(|w| any_equal(&values, w, ignore_case)),
        Predicate::NotIn(list) => !list.iter().any(|w| any_equal(&values, w, ignore_case)),
        Predicate::Gt(bound) => any_ordered(&values, bound, ignore_case, |o| o == Ordering::Greater),
        Predicate::Gte(bound) => any_ordered(&values, bound, ignore_case, |o| o != Ordering::Less),
        Predicate::Lt(bound) => any_ordered(&values, bound, ignore_case, |o| o == Ordering::Less),
        Predicate::Lte(bound) => any_ordered(&values, bound, ignore_case, |o| o != Ordering::Greater),
        Predicate::Range { lower, upper } => scalars(&values).into_iter().any(|v| {
            compare_filter(v, lower, ignore_case).is_some_and(|o| o != Ordering::Less)
                && compare_filter(v, upper, ignore_case).is_some_and(|o| o != Ordering::Greater)
        }),
        Predicate::Text {
            needle,
            mode,
            case_sensitive,
        } => strings(&values)
            .into_iter()
            .any(|s| text_matches(s, needle, *mode, *case_sensitive)),
        Predicate::Excludes { needle } => !strings(&values)
            .into_iter()
            .any(|s| text_matches(s, needle, TextMatch::Contains, false)),
        Predicate::Regex(pattern) => strings(&values).into_iter().any(|s| pattern.is_match(s)),
        Predicate::IsNull => values.is_empty() || values.iter().any(|v| v.is_null()),
        Predicate::IsNotNull => !values.is_empty() && !values.iter().any(|v| v.is_null()),
        Predicate::IsTrue => values.iter().any(|v| *v == &Value::Bool(true)),
        Predicate::IsFalse => values.iter().any(|v| *v == &Value::Bool(false)),
        Predicate::Has(wanted) => arrays(&values)
            .any(|items| items.iter().any(|item| value_equals(item, wanted, ignore_case))),
        Predicate::HasSome(list) => arrays(&values).any(|items| {
            list.iter()
                .any(|w| items.iter().any(|item| value_equals(item, w, ignore_case)))
        }),
        Predicate::HasEvery(list) => arrays(&values).any(|items| {
            list.iter()
                .all(|w| items.iter().any(|item| value_equals(item, w, ignore_case)))
        }),
        Predicate::IsEmpty => arrays(&values).any(|items| items.is_empty()),
        Predicate::JsonContains(wanted) => values.iter().any(|v| json_contains(v, wanted)),
        Predicate::JsonHas(key) => values
            .iter()
            .any(|v| v.as_object().is_some_and(|o| o.contains_key(key))),
    }
}

/// Values plus the elements of any array values
fn scalars<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(*other),
        }
    }
    out
}

fn strings<'a>(values: &[&'a Value]) -> Vec<&'a str> {
    scalars(values).into_iter().filter_map(Value::as_str).collect()
}

fn arrays<'a, 'b>(values: &'b [&'a Value]) -> impl Iterator<Item = &'a Vec<Value>> + 'b {
    values.iter().copied().filter_map(Value::as_array)
}

fn any_equal(values: &[&Value], wanted: &FilterValue, ignore_case: bool) -> bool {
    if matches!(wanted, FilterValue::Null) && values.is_empty() {
        return true;
    }
    values.iter().any(|v| value_equals(v, wanted, ignore_case))
        || scalars(values)
            .into_iter()
            .any(|v| value_equals(v, wanted, ignore_case))
}

fn any_ordered(
    values: &[&Value],
    bound: &FilterValue,
    ignore_case: bool,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    scalars(values)
        .into_iter()
        .any(|v| compare_filter(v, bound, ignore_case).is_some_and(&accept))
}

fn value_equals(stored: &Value, wanted: &FilterValue, ignore_case: bool) -> bool {
    match wanted {
        FilterValue::List(_) | FilterValue::Json(_) => json_equals(stored, &wanted.to_json()),
        _ => compare_filter(stored, wanted, ignore_case) == Some(Ordering::Equal),
    }
}

/// Order a stored value relative to a filter value, if they are comparable
pub(crate) fn compare_filter(stored: &Value, wanted: &FilterValue, ignore_case: bool) -> Option<Ordering> {
    match wanted {
        FilterValue::Null => stored.is_null().then_some(Ordering::Equal),
        FilterValue::Boolean(b) => stored.as_bool().map(|s| s.cmp(b)),
        FilterValue::Number(n) => stored.as_f64().and_then(|s| s.partial_cmp(n)),
        FilterValue::String(s) => stored.as_str().map(|stored| compare_str(stored, s, ignore_case)),
        FilterValue::Date(d) => stored_instant(stored).map(|s| s.cmp(d)),
        FilterValue::List(_) | FilterValue::Json(_) => {
            json_equals(stored, &wanted.to_json()).then_some(Ordering::Equal)
        }
    }
}

fn stored_instant(stored: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    match stored {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn compare_str(a: &str, b: &str, ignore_case: bool) -> Ordering {
    if ignore_case {
        a.to_lowercase().cmp(&b.to_lowercase())
    } else {
        a.cmp(b)
    }
}

fn text_matches(haystack: &str, needle: &str, mode: TextMatch, case_sensitive: bool) -> bool {
    let (haystack, needle) = if case_sensitive {
        (haystack.to_string(), needle.to_string())
    } else {
        (haystack.to_lowercase(), needle.to_lowercase())
    };
    match mode {
        TextMatch::Contains => haystack.contains(&needle),
        TextMatch::StartsWith => haystack.starts_with(&needle),
        TextMatch::EndsWith => haystack.ends_with(&needle),
    }
}

/// JSON equality that treats `1` and `1.0` as equal
pub(crate) fn json_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_equals(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_equals(v, other)))
        }
        _ => a == b,
    }
}

/// Structural containment: objects by subset, arrays by membership
fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, v)| h.get(k).is_some_and(|hv| json_contains(hv, v))),
        (Value::Array(h), Value::Array(n)) => n
            .iter()
            .all(|nv| h.iter().any(|hv| json_contains(hv, nv))),
        (Value::Array(h), scalar) => h.iter().any(|hv| json_equals(hv, scalar)),
        _ => json_equals(haystack, needle),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order over optional JSON values used for sorting
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>, ignore_case: bool) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => compare_str(x, y, ignore_case),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ (Value::Object(_) | Value::Array(_))), Some(y)) if type_rank(Some(x)) == type_rank(Some(y)) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Order two documents by `spec`
pub(crate) fn compare_documents(a: &Document, b: &Document, spec: &SortSpec, ignore_case: bool) -> Ordering {
    for key in spec.keys() {
        let ordering = compare_values(path::get(a, &key.field), path::get(b, &key.field), ignore_case);
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort by `spec`
pub(crate) fn sort_documents(docs: &mut [Document], spec: &SortSpec, collation: Option<&Collation>) {
    if spec.is_empty() {
        return;
    }
    let ignore_case = collation.is_some_and(Collation::ignores_case);
    docs.sort_by(|a, b| compare_documents(a, b, spec, ignore_case));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_filter, SortKey};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn check(filter: &str, d: &Document) -> bool {
        let compiled = parse_filter(filter).unwrap().into_filter();
        matches(&compiled, d, None)
    }

    fn person() -> Document {
        doc(json!({
            "name": "Alice Smith",
            "email": "alice@gmail.com",
            "age": 30,
            "active": true,
            "tags": ["rust", "go"],
            "empty": [],
            "deletedAt": null,
            "meta": {"tier": "gold", "flags": {"beta": true}},
            "createdAt": "2025-03-10T23:59:59.999Z"
        }))
    }

    #[test]
    fn test_equality_and_membership() {
        let p = person();
        assert!(check(r#"{"and":{"age":"30"}}"#, &p));
        assert!(check(r#"{"and":{"age__ne":31}}"#, &p));
        assert!(check(r#"{"and":{"missing__ne":1}}"#, &p));
        assert!(check(r#"{"and":{"tags":"rust"}}"#, &p));
        assert!(check(r#"{"and":{"age__in":[29,30]}}"#, &p));
        assert!(!check(r#"{"and":{"age__nin":[30]}}"#, &p));
        assert!(check(r#"{"and":{"active":"true"}}"#, &p));
    }

    #[test]
    fn test_ordering_and_between() {
        let p = person();
        assert!(check(r#"{"and":{"age__gt":29,"age__lte":30}}"#, &p));
        assert!(!check(r#"{"and":{"age__lt":30}}"#, &p));
        assert!(check(r#"{"and":{"age__between":[18,30]}}"#, &p));
        assert!(!check(r#"{"and":{"age__between":[31,65]}}"#, &p));
        assert!(!check(r#"{"and":{"name__gt":5}}"#, &p));
    }

    #[test]
    fn test_text_operators() {
        let p = person();
        assert!(check(r#"{"and":{"name__like":"SMITH"}}"#, &p));
        assert!(check(r#"{"and":{"name__startsWith":"alice"}}"#, &p));
        assert!(check(r#"{"and":{"email__endsWith":"@GMAIL.com"}}"#, &p));
        assert!(!check(r#"{"and":{"name__exactContains":"smith"}}"#, &p));
        assert!(check(r#"{"and":{"name__exactStartsWith":"Alice"}}"#, &p));
        assert!(!check(r#"{"and":{"name__notContains":"smith"}}"#, &p));
        assert!(check(r#"{"and":{"name__notContains":"bob"}}"#, &p));
        assert!(check(r#"{"and":{"name__regex":"^Al.*th$"}}"#, &p));
        assert!(check(r#"{"and":{"name__search":"ice sm"}}"#, &p));
    }

    #[test]
    fn test_null_and_boolean_checks() {
        let p = person();
        assert!(check(r#"{"and":{"deletedAt__isNull":true}}"#, &p));
        assert!(check(r#"{"and":{"nothing__isNull":true}}"#, &p));
        assert!(check(r#"{"and":{"name__isNotNull":true}}"#, &p));
        assert!(!check(r#"{"and":{"deletedAt__isNotNull":true}}"#, &p));
        assert!(check(r#"{"and":{"active__isTrue":true}}"#, &p));
        assert!(!check(r#"{"and":{"active__isFalse":true}}"#, &p));
    }

    #[test]
    fn test_array_operators() {
        let p = person();
        assert!(check(r#"{"and":{"tags__has":"go"}}"#, &p));
        assert!(check(r#"{"and":{"tags__hasSome":["java","go"]}}"#, &p));
        assert!(!check(r#"{"and":{"tags__hasEvery":["rust","java"]}}"#, &p));
        assert!(check(r#"{"and":{"tags__hasEvery":["rust","go"]}}"#, &p));
        assert!(check(r#"{"and":{"empty__isEmpty":true}}"#, &p));
        assert!(!check(r#"{"and":{"tags__isEmpty":true}}"#, &p));
    }

    #[test]
    fn test_date_operators() {
        let p = person();
        assert!(check(r#"{"and":{"createdAt__day":"2025-03-10"}}"#, &p));
        assert!(!check(r#"{"and":{"createdAt__day":"2025-03-11"}}"#, &p));
        assert!(check(r#"{"and":{"createdAt__month":"2025-03-01"}}"#, &p));
        assert!(check(r#"{"and":{"createdAt__year":"2025-06-01"}}"#, &p));
        assert!(check(r#"{"and":{"createdAt__before":"2025-03-11"}}"#, &p));
        assert!(!check(r#"{"and":{"createdAt__after":"2025-03-11"}}"#, &p));
        assert!(check(r#"{"and":{"createdAt__dateRange":["2025-03-01","2025-03-10"]}}"#, &p));
    }

    #[test]
    fn test_json_operators() {
        let p = person();
        assert!(check(r#"{"and":{"meta__jsonContains":{"flags":{"beta":true}}}}"#, &p));
        assert!(!check(r#"{"and":{"meta__jsonContains":{"tier":"silver"}}}"#, &p));
        assert!(check(r#"{"and":{"meta__jsonHas":"tier"}}"#, &p));
        assert!(!check(r#"{"and":{"meta__jsonHas":"nope"}}"#, &p));
    }

    #[test]
    fn test_groups() {
        let p = person();
        assert!(check(r#"{"or":[{"age":1},{"age":30}]}"#, &p));
        assert!(!check(r#"{"or":[{"age":1},{"age":2}]}"#, &p));
        assert!(!check(r#"{"not":{"age":30}}"#, &p));
        assert!(check(r#"{"and":{"active":true},"not":[{"age":1},{"age":2}]}"#, &p));
    }

    #[test]
    fn test_collation_makes_equality_case_insensitive() {
        let p = person();
        let filter = Filter::eq("name", "alice smith");
        assert!(!matches(&filter, &p, None));
        assert!(matches(&filter, &p, Some(&Collation::case_insensitive("en"))));
    }

    #[test]
    fn test_sort_documents_multi_key_with_missing_values() {
        let mut docs = vec![
            doc(json!({"n": 1, "s": "b"})),
            doc(json!({"n": 2, "s": "a"})),
            doc(json!({"s": "c"})),
            doc(json!({"n": 2, "s": "c"})),
        ];
        let spec = SortSpec(vec![SortKey::desc("n"), SortKey::asc("s")]);
        sort_documents(&mut docs, &spec, None);
        let order: Vec<Value> = docs.into_iter().map(|d| d.get("s").cloned().unwrap()).collect();
        assert_eq!(order, vec![json!("a"), json!("c"), json!("b"), json!("c")]);
    }
}
