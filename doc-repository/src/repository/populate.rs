//! Relation expansion
//!
//! A [`Populate`] replaces the id (or array of ids) stored at a path with
//! the referenced documents from another collection. All ids for one path
//! are loaded with a single `in` query, so expanding a page of records
//! costs one store round trip per path, not one per record.

use std::collections::HashMap;

use serde_json::Value;

use super::traits::ManagedRecord;
use crate::query::{Filter, FilterValue};
use crate::store::{
    get_path, set_path, Document, DocumentStore, FindSpec, Projection, StoreOptions, StoreResult,
    ID_FIELD,
};

/// Expand the reference stored at `path` with documents from `from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Populate {
    /// Path holding the id or ids
    pub path: String,
    /// Collection holding the referenced documents
    pub from: String,
    /// Field of the referenced documents the ids match
    pub foreign_field: String,
    /// Selection applied to the referenced documents
    pub projection: Option<Projection>,
    /// Soft-delete marker of the referenced collection; `None` includes deleted targets
    pub soft_delete_field: Option<String>,
}

impl Populate {
    /// Expand `path` from collection `from`, matching on `_id`
    pub fn new(path: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            from: from.into(),
            foreign_field: ID_FIELD.to_string(),
            projection: None,
            soft_delete_field: Some("isDeleted".to_string()),
        }
    }

    /// Expand `path` with records of type `R`
    pub fn of<R: ManagedRecord>(path: impl Into<String>) -> Self {
        Self {
            foreign_field: R::ID_FIELD.to_string(),
            soft_delete_field: Some(R::SOFT_DELETE_FIELD.to_string()),
            ..Self::new(path, R::COLLECTION)
        }
    }

    /// Match ids against `field` instead of the identity
    #[must_use]
    pub fn foreign_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_field = field.into();
        self
    }

    /// Select fields of the referenced documents
    #[must_use]
    pub fn select(mut self, select: &str) -> Self {
        self.projection = Projection::from_select(select);
        self
    }

    /// Also expand references to soft-deleted targets
    #[must_use]
    pub fn include_deleted(mut self) -> Self {
        self.soft_delete_field = None;
        self
    }

    fn target_filter(&self, ids: Vec<FilterValue>) -> Filter {
        let filter = Filter::is_in(self.foreign_field.clone(), ids);
        match &self.soft_delete_field {
            Some(field) => filter.and_also(Filter::ne(field.clone(), true)),
            None => filter,
        }
    }

    fn target_projection(&self) -> Option<Projection> {
        match &self.projection {
            Some(Projection::Include(fields)) if !fields.contains(&self.foreign_field) => {
                let mut fields = fields.clone();
                fields.push(self.foreign_field.clone());
                Some(Projection::Include(fields))
            }
            other => other.clone(),
        }
    }
}

fn key(value: &Value) -> String {
    value.to_string()
}

/// Replace references in `docs` according to `populates`
pub(crate) async fn populate_documents<S: DocumentStore>(
    store: &S,
    docs: &mut [Document],
    populates: &[Populate],
    options: &StoreOptions,
) -> StoreResult<()> {
    // Hints and collations name indexes of the primary collection.
    let target_options = StoreOptions {
        session: options.session.clone(),
        max_time: options.max_time,
        read_preference: options.read_preference,
        read_concern: options.read_concern,
        ..StoreOptions::default()
    };

    for populate in populates {
        let mut seen = HashMap::new();
        for doc in docs.iter() {
            match get_path(doc, &populate.path) {
                Some(Value::Array(items)) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        seen.entry(key(item)).or_insert_with(|| item.clone());
                    }
                }
                Some(Value::Null) | None => {}
                Some(scalar) => {
                    seen.entry(key(scalar)).or_insert_with(|| scalar.clone());
                }
            }
        }
        if seen.is_empty() {
            continue;
        }

        let ids = seen.into_values().map(FilterValue::from).collect();
        let spec = FindSpec {
            filter: populate.target_filter(ids),
            projection: populate.target_projection(),
            ..FindSpec::default()
        };
        let targets: HashMap<String, Document> = store
            .find(&populate.from, &spec, &target_options)
            .await?
            .into_iter()
            .filter_map(|target| {
                let id = get_path(&target, &populate.foreign_field).map(key)?;
                Some((id, target))
            })
            .collect();

        tracing::debug!(
            path = %populate.path,
            from = %populate.from,
            loaded = targets.len(),
            "expanded relation"
        );

        for doc in docs.iter_mut() {
            let expanded = match get_path(doc, &populate.path) {
                Some(Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .filter_map(|item| targets.get(&key(item)).cloned().map(Value::Object))
                        .collect(),
                ),
                Some(Value::Null) | None => continue,
                Some(scalar) => targets
                    .get(&key(scalar))
                    .cloned()
                    .map_or(Value::Null, Value::Object),
            };
            set_path(doc, &populate.path, expanded);
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "users",
                vec![
                    doc(json!({"_id": "u1", "name": "Ada", "email": "ada@example.com"})),
                    doc(json!({"_id": "u2", "name": "Linus", "isDeleted": true})),
                    doc(json!({"_id": "u3", "name": "Grace"})),
                ],
                &StoreOptions::default(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_scalar_reference_expanded() {
        let store = seeded().await;
        let mut docs = vec![
            doc(json!({"_id": "n1", "author": "u1"})),
            doc(json!({"_id": "n2", "author": "u2"})),
            doc(json!({"_id": "n3"})),
        ];
        let populate = Populate::new("author", "users").select("name");
        populate_documents(&store, &mut docs, &[populate], &StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(docs[0]["author"], json!({"_id": "u1", "name": "Ada"}));
        // Soft-deleted target.
        assert_eq!(docs[1]["author"], Value::Null);
        assert!(!docs[2].contains_key("author"));
    }

    #[tokio::test]
    async fn test_array_reference_drops_missing() {
        let store = seeded().await;
        let mut docs = vec![doc(json!({"_id": "n1", "watchers": ["u3", "u2", "missing", "u1"]}))];
        let populate = Populate::new("watchers", "users").select("name");
        populate_documents(&store, &mut docs, &[populate], &StoreOptions::default())
            .await
            .unwrap();

        let names: Vec<&str> = docs[0]["watchers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Grace", "Ada"]);
    }

    #[tokio::test]
    async fn test_include_deleted_targets() {
        let store = seeded().await;
        let mut docs = vec![doc(json!({"author": "u2"}))];
        let populate = Populate::new("author", "users").include_deleted();
        populate_documents(&store, &mut docs, &[populate], &StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(docs[0]["author"]["name"], json!("Linus"));
    }

    #[tokio::test]
    async fn test_foreign_field_kept_in_projection() {
        let store = seeded().await;
        let mut docs = vec![doc(json!({"contact": "ada@example.com"}))];
        let populate = Populate::new("contact", "users")
            .foreign_field("email")
            .select("name");
        populate_documents(&store, &mut docs, &[populate], &StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(docs[0]["contact"]["name"], json!("Ada"));
        assert_eq!(docs[0]["contact"]["email"], json!("ada@example.com"));
    }
}
