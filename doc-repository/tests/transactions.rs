//! Transaction helper behaviour against the in-memory store

#![cfg(feature = "memory-store")]

mod common;

use std::panic::AssertUnwindSafe;

use common::*;
use doc_repository::prelude::*;
use futures::FutureExt;

#[tokio::test]
async fn test_commit_on_success() {
    let repo = articles();
    let inner = repo.clone();

    let id = repo
        .with_transaction(move |session| async move {
            let created = inner
                .create_one(article("committed"), CreateOptions::new().with_session(session))
                .await?;
            Ok::<_, RepositoryError>(created.id().unwrap_or_default())
        })
        .await
        .unwrap();

    assert!(repo.find_by_id(&id, FindByIdParams::new()).await.is_ok());
    assert_eq!(repo.store().active_sessions(), 0);
}

#[tokio::test]
async fn test_abort_on_error() {
    let repo = articles();
    let inner = repo.clone();

    let error = repo
        .with_transaction(move |session| async move {
            inner
                .create_one(article("discarded"), CreateOptions::new().with_session(session))
                .await?;
            Err::<(), _>(RepositoryError::validation_failed("changed my mind"))
        })
        .await
        .unwrap_err();

    assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    assert!(repo.store().documents("articles").await.is_empty());
    assert_eq!(repo.store().active_sessions(), 0);
}

#[tokio::test]
async fn test_panic_aborts_and_releases_session() {
    let repo = articles();
    let inner = repo.clone();

    let outcome = AssertUnwindSafe(repo.with_transaction(move |session| async move {
        inner
            .create_one(article("doomed"), CreateOptions::new().with_session(session))
            .await?;
        if inner.settings().lean_by_default {
            panic!("boom");
        }
        Ok::<_, RepositoryError>(())
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert!(repo.store().documents("articles").await.is_empty());
    assert_eq!(repo.store().active_sessions(), 0);
}

#[tokio::test]
async fn test_concurrent_write_conflicts() {
    let repo = articles();
    seed(&repo, 1).await;
    let inner = repo.clone();

    let error = repo
        .with_transaction(move |session| async move {
            inner
                .create_one(article("inside"), CreateOptions::new().with_session(session))
                .await?;
            inner.create_one(article("outside"), CreateOptions::new()).await?;
            Ok::<_, RepositoryError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(error.kind, RepositoryErrorKind::TransactionConflict);
    assert_eq!(error.operation, RepositoryOperation::Transaction);
    assert!(error.is_retriable());

    let stored = titles(&repo.find(FindParams::new(Filter::default())).await.unwrap());
    assert!(stored.contains(&"outside".to_string()));
    assert!(!stored.contains(&"inside".to_string()));
    assert_eq!(repo.store().active_sessions(), 0);
}

#[tokio::test]
async fn test_reads_inside_transaction_see_own_writes() {
    let repo = articles();
    let inner = repo.clone();

    let (inside, outside) = repo
        .with_transaction(move |session| async move {
            inner
                .create_one(article("pending"), CreateOptions::new().with_session(session.clone()))
                .await?;
            let inside = inner
                .count_documents(Filter::default(), CountOptions::new().with_session(session))
                .await?;
            let outside = inner.count_documents(Filter::default(), CountOptions::new()).await?;
            Ok::<_, RepositoryError>((inside, outside))
        })
        .await
        .unwrap();

    assert_eq!((inside, outside), (1, 0));
    assert_eq!(repo.count_documents(Filter::default(), CountOptions::new()).await.unwrap(), 1);
}
