//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory, sorted,
//! transactional implementation of [`StorageBackend`], suited to tests and
//! development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`] for efficient prefix scans
//! - **Serializable transactions**: Optimistic concurrency with commit-time validation of every
//!   key and range the transaction read
//!
//! # Example
//!
//! ```
//! use tenantkv_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//!     let value = backend.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Performance Characteristics
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | get | O(log n) |
//! | set | O(log n) |
//! | delete | O(log n) |
//! | get_range | O(log n + k) where k is result size |
//! | commit | O(r log n + w log n) for r recorded reads and w writes |
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits. Use
//!   [`RedbBackend`](crate::RedbBackend) for a durable store.
//! - Commits are serialized behind a single write lock, and validation
//!   re-scans every range the transaction read while holding it. A commit
//!   that scanned a large account therefore briefly blocks reads and commits
//!   of every other account.

use std::{
    collections::BTreeMap,
    ops::{Bound, RangeBounds},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    metrics::{Metrics, MetricsCollector},
    transaction::Transaction,
    types::{KeyRange, KeyValue, PendingWrites, as_slice_bound, is_degenerate, overlay_pending},
};

type Data = BTreeMap<Vec<u8>, Bytes>;

fn scan(data: &Data, start: Bound<&[u8]>, end: Bound<&[u8]>) -> Vec<KeyValue> {
    if is_degenerate(start, end) {
        return Vec::new();
    }
    data.range::<[u8], _>((start, end))
        .map(|(k, v)| KeyValue::new(Bytes::copy_from_slice(k), v.clone()))
        .collect()
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data and metrics.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<Data>>,
    metrics: Metrics,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").field("keys", &self.len()).finish_non_exhaustive()
    }
}

impl MetricsCollector for MemoryBackend {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let started = Instant::now();
        let value = self.data.read().get(key).cloned();
        self.metrics.record_get(started.elapsed());
        Ok(value)
    }

    #[tracing::instrument(skip(self, key, value), fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let started = Instant::now();
        self.data.write().insert(key, Bytes::from(value));
        self.metrics.record_set(started.elapsed());
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let started = Instant::now();
        self.data.write().remove(key);
        self.metrics.record_delete(started.elapsed());
        Ok(())
    }

    #[tracing::instrument(skip(self, range))]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let started = Instant::now();
        let results = {
            let data = self.data.read();
            scan(&data, as_slice_bound(range.start_bound()), as_slice_bound(range.end_bound()))
        };
        self.metrics.record_get_range(started.elapsed());
        Ok(results)
    }

    #[tracing::instrument(skip(self))]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        // Acquiring the read lock proves we're not deadlocked
        let _unused = self.data.read();
        Ok(())
    }
}

/// A committed range as seen by a transaction, re-checked at commit.
#[derive(Debug)]
struct ObservedRange {
    range: KeyRange,
    entries: Vec<KeyValue>,
}

/// In-memory transaction implementation.
///
/// Buffers writes and deletes until commit and records every committed key
/// and range it reads. Commit validates the recorded reads against the live
/// map under the write lock, then applies the buffer in the same critical
/// section.
struct MemoryTransaction {
    backend: MemoryBackend,
    pending_writes: PendingWrites,
    read_keys: BTreeMap<Vec<u8>, Option<Bytes>>,
    read_ranges: Vec<ObservedRange>,
}

impl MemoryTransaction {
    fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            pending_writes: BTreeMap::new(),
            read_keys: BTreeMap::new(),
            read_ranges: Vec::new(),
        }
    }

    /// Returns `true` if every recorded read still matches committed data.
    fn reads_still_valid(&self, data: &Data) -> bool {
        let keys_valid = self
            .read_keys
            .iter()
            .all(|(key, observed)| data.get(key.as_slice()) == observed.as_ref());

        keys_valid
            && self.read_ranges.iter().all(|observed| {
                let (start, end) = &observed.range;
                scan(data, as_slice_bound(start.as_ref()), as_slice_bound(end.as_ref()))
                    == observed.entries
            })
    }

    fn validate_and_apply(self) -> StorageResult<()> {
        fail_point!("memory-before-commit", |_| Err(StorageError::conflict()));

        let mut data = self.backend.data.write();

        if !self.reads_still_valid(&data) {
            tracing::debug!(
                read_keys = self.read_keys.len(),
                read_ranges = self.read_ranges.len(),
                "read set changed since it was observed, rejecting commit"
            );
            return Err(StorageError::conflict());
        }

        for (key, value) in self.pending_writes {
            match value {
                Some(v) => {
                    data.insert(key, Bytes::from(v));
                },
                None => {
                    data.remove(&key);
                },
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        // Read-your-writes
        if let Some(value) = self.pending_writes.get(key) {
            return Ok(value.as_ref().map(|v| Bytes::copy_from_slice(v)));
        }

        let value = self.backend.data.read().get(key).cloned();
        self.read_keys.entry(key.to_vec()).or_insert_with(|| value.clone());
        Ok(value)
    }

    async fn get_range(&mut self, range: KeyRange) -> StorageResult<Vec<KeyValue>> {
        let (start, end) = (as_slice_bound(range.0.as_ref()), as_slice_bound(range.1.as_ref()));

        let committed = {
            let data = self.backend.data.read();
            scan(&data, start, end)
        };

        let merged = overlay_pending(&committed, &self.pending_writes, start, end);
        self.read_ranges.push(ObservedRange { range, entries: committed });
        Ok(merged)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.pending_writes.insert(key, None);
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let metrics = self.backend.metrics.clone();
        let started = Instant::now();

        let result = self.validate_and_apply();

        metrics.record_transaction(started.elapsed());
        if matches!(result, Err(StorageError::Conflict)) {
            metrics.record_conflict();
        }
        result
    }
}
