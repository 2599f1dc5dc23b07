#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p tenantkv-storage --features failpoints --test failpoint_tests
//! ```

use tenantkv_storage::{MemoryBackend, MetricsCollector, RedbBackend, StorageBackend, StorageError};

#[tokio::test]
async fn commit_failpoint_rejects_commit_without_applying() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "return").expect("failed to configure fail point");

    let backend = MemoryBackend::new();
    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"key".to_vec(), b"value".to_vec());
    let result = txn.commit().await;

    assert!(matches!(result, Err(StorageError::Conflict)), "got: {result:?}");
    assert!(backend.get(b"key").await.expect("get").is_none());
    assert_eq!(backend.metrics().snapshot().conflict_count, 1);

    scenario.teardown();
}

#[tokio::test]
async fn commit_failpoint_fires_once_then_commits() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-before-commit", "1*return->off").expect("failed to configure fail point");

    let backend = MemoryBackend::new();

    let mut first = backend.transaction().await.expect("txn");
    first.set(b"key".to_vec(), b"one".to_vec());
    assert!(first.commit().await.is_err(), "first commit should hit the fail point");

    let mut second = backend.transaction().await.expect("txn");
    second.set(b"key".to_vec(), b"two".to_vec());
    second.commit().await.expect("second commit should succeed");

    assert_eq!(backend.get(b"key").await.expect("get").as_deref(), Some(&b"two"[..]));

    scenario.teardown();
}

#[tokio::test]
async fn commit_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();

    let backend = MemoryBackend::new();
    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"key".to_vec(), b"value".to_vec());
    txn.commit().await.expect("commit should succeed without fail point");

    scenario.teardown();
}

#[tokio::test]
async fn redb_commit_failpoint_rejects_commit_and_releases_the_transaction() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("redb-before-commit", "1*return->off").expect("failed to configure fail point");

    let dir = tempfile::tempdir().expect("tempdir");
    let backend = RedbBackend::open(dir.path().join("data.redb")).expect("open");

    let mut first = backend.transaction().await.expect("txn");
    first.set(b"key".to_vec(), b"one".to_vec());
    let result = first.commit().await;
    assert!(matches!(result, Err(StorageError::Conflict)), "got: {result:?}");
    assert!(backend.get(b"key").await.expect("get").is_none());

    let mut second = backend.transaction().await.expect("txn");
    second.set(b"key".to_vec(), b"two".to_vec());
    second.commit().await.expect("second commit should succeed");

    assert_eq!(backend.get(b"key").await.expect("get").as_deref(), Some(&b"two"[..]));
    assert_eq!(backend.metrics().snapshot().conflict_count, 1);

    scenario.teardown();
}
