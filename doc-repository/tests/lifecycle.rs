//! Record lifecycle through the generic repository

#![cfg(feature = "memory-store")]

mod common;

use std::sync::Arc;

use common::*;
use doc_repository::config::RepositoryConfig;
use doc_repository::prelude::*;

#[tokio::test]
async fn test_double_soft_delete_is_not_found() {
    let repo = articles();
    let id = repo
        .create_one(article("draft"), CreateOptions::new())
        .await
        .unwrap()
        .id()
        .unwrap();

    repo.soft_delete_by_id(&id, UpdateOptions::new()).await.unwrap();
    let error = repo
        .soft_delete_by_id(&id, UpdateOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, RepositoryErrorKind::NotFound);
    assert_eq!(error.entity_type.as_deref(), Some("Article"));
    assert_eq!(error.entity_id.as_deref(), Some(id.as_str()));

    // The record itself is still stored, flagged
    let stored = repo.store().documents("articles").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("isDeleted"), Some(&json!(true)));
}

#[tokio::test]
async fn test_soft_deleted_records_leave_every_default_path() {
    let repo = articles();
    let ids = seed(&repo, 4).await;
    let hidden = &ids[1];
    repo.soft_delete_by_id(hidden, UpdateOptions::new()).await.unwrap();

    let found = repo.find(FindParams::new(Filter::default())).await.unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|r| r.id().as_ref() != Some(hidden)));

    let by_title = repo
        .find_one(FindOneParams::new(Filter::eq("title", "article-01")))
        .await
        .unwrap();
    assert!(by_title.is_none());

    let updated = repo
        .update_by_id(hidden, Update::new().set("views", 3), UpdateOptions::new())
        .await
        .unwrap_err();
    assert_eq!(updated.kind, RepositoryErrorKind::NotFound);

    let deleted = repo
        .delete_by_id(hidden, DeleteOptions::new())
        .await
        .unwrap_err();
    assert_eq!(deleted.kind, RepositoryErrorKind::NotFound);

    let everything = repo
        .find(FindParams::new(Filter::default()).scope(SoftDeleteScope::IncludeDeleted))
        .await
        .unwrap();
    assert_eq!(everything.len(), 4);
}

#[tokio::test]
async fn test_crud_round() -> anyhow::Result<()> {
    let repo = articles();
    let created = repo.create_one(article("first"), CreateOptions::new()).await?;
    let id = created.id().ok_or_else(|| anyhow::anyhow!("created record has no id"))?;
    assert!(created.get("createdAt").is_some());

    let updated = repo
        .update_by_id(&id, Update::new().set("status", "archived").inc("views", 5), UpdateOptions::new())
        .await?;
    assert_eq!(updated.get("status"), Some(json!("archived")));
    assert_eq!(updated.get("views"), Some(json!(5)));

    let typed = repo
        .find_by_id(&id, FindByIdParams::new().with_lean(false))
        .await?
        .into_inner()?;
    assert_eq!(typed.status, "archived");

    let removed = repo.delete_by_id(&id, DeleteOptions::new()).await?;
    assert_eq!(removed.id(), Some(id.clone()));
    assert!(repo.store().documents("articles").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_upsert_miss_inserts_a_managed_record() -> anyhow::Result<()> {
    let repo = articles();
    seed(&repo, 2).await;

    let inserted = repo
        .update_one(
            Filter::eq("title", "fresh"),
            Update::new().set("status", "draft"),
            UpdateOptions::new().upsert(),
        )
        .await?
        .ok_or_else(|| anyhow::anyhow!("upsert returned nothing"))?;

    assert_eq!(inserted.get("title"), Some(json!("fresh")));
    assert_eq!(inserted.get("status"), Some(json!("draft")));
    assert!(inserted.get("createdAt").is_some());
    assert!(inserted.get("updatedAt").is_some());
    assert_eq!(inserted.get("isDeleted"), Some(json!(false)));
    let id = inserted.id().ok_or_else(|| anyhow::anyhow!("upserted record has no id"))?;

    let page = repo.get_all_data(GetAllParams::new().length("50")).await?;
    assert_eq!(page.data.len(), 3);
    assert!(titles(&page.data).contains(&"fresh".to_string()));

    // A second upsert matches the stored record and keeps its creation stamp
    let matched = repo
        .update_one(
            Filter::eq("title", "fresh"),
            Update::new().set("status", "published"),
            UpdateOptions::new().upsert(),
        )
        .await?
        .ok_or_else(|| anyhow::anyhow!("upsert returned nothing"))?;
    assert_eq!(matched.id(), Some(id));
    assert_eq!(matched.get("createdAt"), inserted.get("createdAt"));
    assert_eq!(repo.store().documents("articles").await.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_bulk_soft_delete_and_delete() {
    let repo = articles();
    seed(&repo, 6).await;

    let marked = repo
        .soft_delete_many(Filter::is_in("title", vec!["article-00".into(), "article-01".into()]), UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(marked.len(), 2);
    assert!(marked.iter().all(|r| r.get("isDeleted") == Some(json!(true))));

    let outcome = repo
        .delete_many(Filter::default(), DeleteOptions::new())
        .await
        .unwrap();
    assert_eq!(outcome.deleted_count, 4);

    // Soft-deleted records survive a default-path physical delete
    assert_eq!(repo.store().documents("articles").await.len(), 2);
}

#[tokio::test]
async fn test_find_or_create() {
    let repo = articles();
    let filter = || Filter::eq("title", "singleton");

    let first = repo
        .find_or_create(filter(), article("singleton"), CreateOptions::new())
        .await
        .unwrap();
    let second = repo
        .find_or_create(filter(), article("singleton"), CreateOptions::new())
        .await
        .unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(repo.count_documents(filter(), CountOptions::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_find_or_create_surfaces_conflict_with_hidden_record() {
    let repo = articles();
    repo.store()
        .create_index("articles", IndexSpec::new("title_unique", &["title"]).unique())
        .await
        .unwrap();
    let hidden = repo
        .create_one(article("contested"), CreateOptions::new())
        .await
        .unwrap()
        .id()
        .unwrap();
    repo.soft_delete_by_id(&hidden, UpdateOptions::new()).await.unwrap();

    // The lookup cannot see the soft-deleted holder of the unique key, so
    // the insert is rejected and the repeated lookup still finds nothing.
    let error = repo
        .find_or_create(Filter::eq("title", "contested"), article("contested"), CreateOptions::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind, RepositoryErrorKind::AlreadyExists);
    assert_eq!(error.operation, RepositoryOperation::FindOrCreate);
}

#[tokio::test]
async fn test_populate_expands_references() {
    let store = Arc::new(InMemoryStore::new());
    let authors: GenericRepository<Author, InMemoryStore> =
        GenericRepository::from_shared(Arc::clone(&store), RepositoryConfig::default());
    let repo: Articles = GenericRepository::from_shared(store, RepositoryConfig::default());

    let ada = authors
        .create_one(Author { id: None, name: "Ada".into() }, CreateOptions::new())
        .await
        .unwrap()
        .id()
        .unwrap();
    let gone = authors
        .create_one(Author { id: None, name: "Gone".into() }, CreateOptions::new())
        .await
        .unwrap()
        .id()
        .unwrap();
    authors.soft_delete_by_id(&gone, UpdateOptions::new()).await.unwrap();

    let by_ada = Article { author: Some(json!(ada)), ..article("by ada") };
    let by_gone = Article { author: Some(json!(gone)), ..article("by gone") };
    let ids: Vec<String> = repo
        .create_many(vec![by_ada, by_gone], CreateOptions::new())
        .await
        .unwrap()
        .iter()
        .filter_map(Record::id)
        .collect();

    let options = QueryOptions::new().populate(Populate::of::<Author>("author").select("name"));
    let expanded = repo.find_by_id(&ids[0], options.clone()).await.unwrap();
    assert_eq!(expanded.get("author"), Some(json!({"_id": ada, "name": "Ada"})));

    let dangling = repo.find_by_id(&ids[1], options).await.unwrap();
    assert_eq!(dangling.get("author"), Some(Value::Null));
}

#[tokio::test]
async fn test_unknown_hint_is_database_error() {
    let repo = articles();
    seed(&repo, 1).await;

    let error = repo
        .find(FindParams::new(Filter::default()).options(QueryOptions::new().with_hint("no_such_index")))
        .await
        .unwrap_err();
    assert_eq!(error.kind, RepositoryErrorKind::DatabaseError);
    assert_eq!(error.operation, RepositoryOperation::Find);
}

#[tokio::test]
async fn test_aggregate_runs_caller_pipeline() {
    let repo = articles();
    seed(&repo, 5).await;

    let docs = repo
        .aggregate(
            &[
                Stage::Match(Filter::is_in("title", vec!["article-01".into(), "article-03".into()])),
                Stage::Count("n".into()),
            ],
            AggregateOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("n"), Some(&json!(2)));
}
