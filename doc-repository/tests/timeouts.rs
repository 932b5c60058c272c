//! Execution-time ceilings

#![cfg(feature = "memory-store")]

mod common;

use std::time::Duration;

use common::*;
use doc_repository::config::RepositoryConfig;
use doc_repository::prelude::*;

fn slow_repository() -> Articles {
    let settings = RepositoryConfig {
        default_max_time_ms: 50,
        ..RepositoryConfig::default()
    };
    GenericRepository::with_config(InMemoryStore::new(), settings)
}

#[tokio::test(start_paused = true)]
async fn test_default_ceiling_times_out() {
    let repo = slow_repository();
    seed(&repo, 3).await;
    repo.store().set_latency(Duration::from_millis(200));

    let error = repo.find(FindParams::new(Filter::default())).await.unwrap_err();
    assert_eq!(error.kind, RepositoryErrorKind::Timeout);
    assert_eq!(error.operation, RepositoryOperation::Find);
    assert!(error.is_retriable());

    let error = repo.get_all_data(GetAllParams::new()).await.unwrap_err();
    assert_eq!(error.kind, RepositoryErrorKind::Timeout);
    assert_eq!(error.operation, RepositoryOperation::GetAllData);
}

#[tokio::test(start_paused = true)]
async fn test_per_call_ceiling_overrides_default() {
    let repo = slow_repository();
    seed(&repo, 3).await;
    repo.store().set_latency(Duration::from_millis(200));

    let found = repo
        .find(FindParams::new(Filter::default()).options(QueryOptions::new().with_max_time(Duration::from_secs(1))))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);

    let page = repo
        .get_all_data(GetAllParams::new().max_time(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_default_means_unbounded() {
    let settings = RepositoryConfig {
        default_max_time_ms: 0,
        ..RepositoryConfig::default()
    };
    let repo: Articles =
        GenericRepository::with_config(InMemoryStore::with_latency(Duration::from_secs(60)), settings);

    let created = repo.create_one(article("patient"), CreateOptions::new()).await;
    assert!(created.is_ok());
}
