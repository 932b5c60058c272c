//! Aggregation pipeline execution over in-memory document sets

use std::collections::HashMap;

use serde_json::Value;

use super::error::{StoreError, StoreResult};
use super::eval;
use super::path;
use super::types::{Collation, Document, Stage};

/// Foreign collections and comparison rules available to a pipeline run
pub(crate) struct PipelineContext<'a> {
    pub(crate) foreign: &'a HashMap<String, Vec<Document>>,
    pub(crate) collation: Option<&'a Collation>,
}

/// Collections referenced by `$lookup` stages, including inside facets
pub(crate) fn lookup_targets(stages: &[Stage]) -> Vec<String> {
    let mut targets = Vec::new();
    for stage in stages {
        match stage {
            Stage::Lookup { from, .. } if !targets.contains(from) => targets.push(from.clone()),
            Stage::Facet(branches) => {
                for (_, branch) in branches {
                    for target in lookup_targets(branch) {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    targets
}

/// Run `stages` over `docs`
pub(crate) fn run(mut docs: Vec<Document>, stages: &[Stage], ctx: &PipelineContext<'_>) -> StoreResult<Vec<Document>> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => docs
                .into_iter()
                .filter(|d| eval::matches(filter, d, ctx.collation))
                .collect(),
            Stage::Sort(spec) => {
                eval::sort_documents(&mut docs, spec, ctx.collation);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(to_usize(*n)).collect(),
            Stage::Limit(0) => {
                return Err(StoreError::InvalidOperation(
                    "the limit must be positive".to_string(),
                ))
            }
            Stage::Limit(n) => {
                docs.truncate(to_usize(*n));
                docs
            }
            Stage::Project(projection) => docs.into_iter().map(|d| projection.apply(d)).collect(),
            Stage::Unset(fields) => docs
                .into_iter()
                .map(|mut d| {
                    for field in fields {
                        path::remove(&mut d, field);
                    }
                    d
                })
                .collect(),
            Stage::Set(values) => docs
                .into_iter()
                .map(|mut d| {
                    for (field, value) in values {
                        path::set(&mut d, field, value.clone());
                    }
                    d
                })
                .collect(),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => {
                let foreign = ctx.foreign.get(from).map(Vec::as_slice).unwrap_or_default();
                docs.into_iter()
                    .map(|mut d| {
                        let joined = join(&d, local_field, foreign, foreign_field);
                        path::set(&mut d, as_field, Value::Array(joined));
                        d
                    })
                    .collect()
            }
            Stage::Facet(branches) => {
                let mut out = Document::new();
                for (name, branch) in branches {
                    let results = run(docs.clone(), branch, ctx)?;
                    out.insert(
                        name.clone(),
                        Value::Array(results.into_iter().map(Value::Object).collect()),
                    );
                }
                vec![out]
            }
            Stage::Count(field) => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), Value::from(docs.len() as u64));
                    vec![out]
                }
            }
        };
    }
    Ok(docs)
}

static NULL: Value = Value::Null;

fn join(doc: &Document, local_field: &str, foreign: &[Document], foreign_field: &str) -> Vec<Value> {
    let mut keys: Vec<&Value> = Vec::new();
    for value in path::resolve(doc, local_field) {
        match value {
            Value::Array(items) => keys.extend(items.iter()),
            other => keys.push(other),
        }
    }
    if keys.is_empty() {
        keys.push(&NULL);
    }

    foreign
        .iter()
        .filter(|candidate| {
            let candidate_values = path::resolve(candidate, foreign_field);
            if candidate_values.is_empty() {
                return keys.iter().any(|k| k.is_null());
            }
            candidate_values
                .iter()
                .any(|cv| keys.iter().any(|k| eval::json_equals(cv, k)))
        })
        .cloned()
        .map(Value::Object)
        .collect()
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
