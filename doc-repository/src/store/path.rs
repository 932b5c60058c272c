//! Dotted field paths over JSON documents

use serde_json::{Map, Value};

use super::types::Document;

/// All values reachable at `path`, descending into arrays of objects
///
/// Numeric segments index into arrays. Missing paths yield an empty list.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => next.extend(items.get(index)),
                    Err(_) => {
                        for item in items {
                            if let Value::Object(map) = item {
                                next.extend(map.get(segment));
                            }
                        }
                    }
                },
                _ => {}
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}

/// First value at `path`, if any
pub(crate) fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    resolve(doc, path).into_iter().next()
}

/// Set `path`, creating intermediate objects
///
/// Non-object intermediates are replaced.
pub(crate) fn set(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set(child, rest, value);
            }
        }
    }
}

/// Remove `path`; returns the removed value
pub(crate) fn remove(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(child)) => remove(child, rest),
            _ => None,
        },
    }
}
