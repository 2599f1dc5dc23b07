#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Fail-point driven tests of conflict handling in `NamespaceStore`.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p tenantkv-namespace --features failpoints --test failpoint_tests
//! ```

use std::time::Duration;

use tenantkv_namespace::{ConflictRetryConfig, ErrorKind, NamespaceError, NamespaceStore, QuotaConfig};
use tenantkv_storage::{MemoryBackend, MetricsCollector, StorageError};

fn store(max_retries: u32) -> (NamespaceStore<MemoryBackend>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let retry = ConflictRetryConfig::builder()
        .max_retries(max_retries)
        .initial_backoff(Duration::from_micros(10))
        .max_backoff(Duration::from_micros(100))
        .build()
        .expect("valid retry config");
    (NamespaceStore::with_retry_config(backend.clone(), retry), backend)
}

#[tokio::test]
async fn transient_conflicts_are_retried() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "2*return->off").expect("failed to configure fail point");

    let (store, _) = store(5);
    store.insert("alice", "k", b"v", &QuotaConfig::UNLIMITED).await.expect("insert after retries");

    assert_eq!(store.retrieve("alice", "k").await.unwrap(), b"v");
    assert_eq!(store.metrics().snapshot().retry_count, 2);

    scenario.teardown();
}

#[tokio::test]
async fn persistent_conflicts_surface_as_engine_errors() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "return").expect("failed to configure fail point");

    let (store, backend) = store(3);
    let err = store.insert("alice", "k", b"v", &QuotaConfig::UNLIMITED).await.unwrap_err();

    assert!(matches!(err, NamespaceError::Engine(StorageError::Conflict)), "got: {err:?}");
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(backend.is_empty(), "no attempt may leave a partial write");
    assert_eq!(store.metrics().snapshot().retry_count, 3);
    assert_eq!(store.metrics().snapshot().retry_exhausted_count, 1);
    assert_eq!(backend.metrics().snapshot().conflict_count, 4);

    scenario.teardown();
}

#[tokio::test]
async fn delete_retries_then_removes() {
    let scenario = fail::FailScenario::setup();

    let (store, _) = store(5);
    store.insert("alice", "k", b"v", &QuotaConfig::UNLIMITED).await.unwrap();

    fail::cfg("memory-before-commit", "1*return->off").expect("failed to configure fail point");
    store.delete("alice", "k").await.expect("delete after retry");

    assert_eq!(store.retrieve("alice", "k").await.unwrap_err().kind(), ErrorKind::KeyNotFound);
    assert_eq!(store.metrics().snapshot().retry_count, 1);

    scenario.teardown();
}

#[tokio::test]
async fn quota_rejections_never_reach_commit() {
    let scenario = fail::FailScenario::setup();

    let (store, _) = store(0);
    let quota = QuotaConfig::builder().max_keys_per_account(1).build();
    store.insert("alice", "a", b"v", &quota).await.unwrap();

    // Any commit would fail now, but the quota check rejects before committing
    fail::cfg("memory-before-commit", "return").expect("failed to configure fail point");
    let err = store.insert("alice", "b", b"v", &quota).await.unwrap_err();
    assert!(matches!(err, NamespaceError::KeyLimitReached { limit: 1 }));

    scenario.teardown();
}

#[tokio::test]
async fn retry_path_passes_through_the_backoff_point() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "1*return->off").expect("failed to configure fail point");
    fail::cfg("conflict-retry-before-sleep", "panic").expect("failed to configure fail point");

    let (store, backend) = store(5);
    let store = std::sync::Arc::new(store);
    let task = tokio::spawn({
        let store = std::sync::Arc::clone(&store);
        async move { store.insert("alice", "k", b"v", &QuotaConfig::UNLIMITED).await }
    });

    let join_err = task.await.expect_err("the retry should hit the backoff fail point");
    assert!(join_err.is_panic());
    assert!(backend.is_empty(), "the conflicted attempt must not have applied");

    scenario.teardown();
}
