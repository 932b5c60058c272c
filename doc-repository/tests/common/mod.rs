//! Shared fixtures for integration tests

#![allow(dead_code)]

use doc_repository::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub views: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ManagedRecord for Article {
    const COLLECTION: &'static str = "articles";
    const ENTITY_NAME: &'static str = "Article";

    fn validate(&self) -> RepositoryResult<()> {
        if self.title.trim().is_empty() {
            return Err(RepositoryError::validation_failed("title is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl ManagedRecord for Author {
    const COLLECTION: &'static str = "authors";
    const ENTITY_NAME: &'static str = "Author";
    const TIMESTAMPS: bool = false;
}

pub type Articles = GenericRepository<Article, InMemoryStore>;

pub fn article(title: &str) -> Article {
    Article {
        id: None,
        title: title.to_string(),
        status: "published".to_string(),
        views: 0,
        secret: None,
        author: None,
        created_at: None,
    }
}

pub fn article_at(title: &str, created_at: &str) -> Article {
    Article {
        created_at: Some(created_at.to_string()),
        ..article(title)
    }
}

pub fn articles() -> Articles {
    GenericRepository::new(InMemoryStore::new())
}

/// Insert `count` published articles created one hour apart, oldest first
pub async fn seed(repo: &Articles, count: usize) -> Vec<String> {
    let batch = (0..count)
        .map(|i| {
            article_at(
                &format!("article-{i:02}"),
                &format!("2024-01-{:02}T{:02}:00:00.000Z", 1 + i / 24, i % 24),
            )
        })
        .collect();
    repo.create_many(batch, CreateOptions::new())
        .await
        .expect("seed articles")
        .iter()
        .filter_map(Record::id)
        .collect()
}

pub fn titles(records: &[Record<Article>]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("title").and_then(|t| t.as_str().map(str::to_string)))
        .collect()
}
