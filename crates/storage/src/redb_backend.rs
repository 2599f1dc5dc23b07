//! Durable storage backend on [`redb`].
//!
//! [`RedbBackend`] keeps every entry in a single redb table, keyed by the raw
//! key bytes, so the on-disk layout is exactly the sorted keyspace the
//! namespace layer writes. Data survives process restarts: reopening the
//! same path sees everything committed before.
//!
//! # Concurrency
//!
//! Transactions are optimistic, as with [`MemoryBackend`](crate::MemoryBackend),
//! but validation never re-reads data. Each transaction remembers the commit
//! sequence number it started at. Every commit appends the keys it wrote to an
//! in-process commit log. At commit time a transaction is rejected with
//! [`StorageError::Conflict`] if a later commit wrote a key it read or a key
//! inside a range it scanned. Validation therefore costs time proportional to
//! the writes that raced with the transaction, not to the size of the ranges
//! it scanned, and log entries are dropped as soon as no open transaction
//! predates them.
//!
//! Rewriting a key with its current value still counts as a write here.
//!
//! Commits run one at a time (redb allows a single write transaction) and are
//! durable when `commit` returns.
//!
//! # Example
//!
//! ```no_run
//! use tenantkv_storage::{RedbBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = RedbBackend::open("/var/lib/tenantkv/data.redb").unwrap();
//! backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//! # });
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::Display,
    ops::{Bound, RangeBounds},
    path::Path,
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    metrics::{Metrics, MetricsCollector},
    transaction::Transaction,
    types::{KeyRange, KeyValue, PendingWrites, as_slice_bound, is_degenerate, overlay_pending},
};

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

fn engine_error(context: &str, err: impl Display) -> StorageError {
    StorageError::internal(format!("{context}: {err}"))
}

/// Keys written by recent commits, kept while an open transaction may need
/// to validate against them.
#[derive(Debug, Default)]
struct CommitLog {
    /// Sequence number of the latest commit.
    seq: u64,
    /// `(commit seq, keys written)`, oldest first.
    entries: VecDeque<(u64, Vec<Vec<u8>>)>,
    /// Start sequence numbers of open transactions, with their counts.
    open: BTreeMap<u64, usize>,
}

impl CommitLog {
    fn begin(&mut self) -> u64 {
        *self.open.entry(self.seq).or_default() += 1;
        self.seq
    }

    fn finish(&mut self, start: u64) {
        if let Some(count) = self.open.get_mut(&start) {
            *count -= 1;
            if *count == 0 {
                self.open.remove(&start);
            }
        }
        self.prune();
    }

    /// Drops entries that no open transaction started before.
    fn prune(&mut self) {
        let horizon = self.open.keys().next().copied().unwrap_or(self.seq);
        while self.entries.front().is_some_and(|(seq, _)| *seq <= horizon) {
            self.entries.pop_front();
        }
    }

    fn record(&mut self, keys: Vec<Vec<u8>>) {
        self.seq += 1;
        if !self.open.is_empty() {
            self.entries.push_back((self.seq, keys));
        }
    }

    /// Returns `true` if a commit after `start` wrote anything `reads` covers.
    fn invalidates(&self, start: u64, reads: &ReadSet) -> bool {
        self.entries
            .iter()
            .filter(|(seq, _)| *seq > start)
            .flat_map(|(_, keys)| keys)
            .any(|key| reads.covers(key))
    }
}

/// Keys and ranges a transaction read from committed data.
#[derive(Debug, Default)]
struct ReadSet {
    keys: BTreeSet<Vec<u8>>,
    ranges: Vec<KeyRange>,
}

impl ReadSet {
    fn covers(&self, key: &Vec<u8>) -> bool {
        self.keys.contains(key) || self.ranges.iter().any(|range| range.contains(key))
    }
}

/// Durable storage backend backed by a redb database file.
///
/// Cheaply cloneable; clones share the database handle, commit log and
/// metrics. The database file stays locked until the last clone is dropped.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    commits: Arc<Mutex<CommitLog>>,
    metrics: Metrics,
}

impl RedbBackend {
    /// Opens the database at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the file cannot be opened or is
    /// not a redb database.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| engine_error("open database", e))?;

        let txn = db.begin_write().map_err(|e| engine_error("begin write", e))?;
        txn.open_table(ENTRIES).map_err(|e| engine_error("create table", e))?;
        txn.commit().map_err(|e| engine_error("commit", e))?;

        tracing::debug!(path = %path.display(), "opened redb storage");
        Ok(Self { db: Arc::new(db), commits: Arc::default(), metrics: Metrics::new() })
    }

    fn read_value(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let txn = self.db.begin_read().map_err(|e| engine_error("begin read", e))?;
        let table = txn.open_table(ENTRIES).map_err(|e| engine_error("open table", e))?;
        let value = table.get(key).map_err(|e| engine_error("read", e))?;
        Ok(value.map(|guard| Bytes::copy_from_slice(guard.value())))
    }

    fn scan(&self, start: Bound<&[u8]>, end: Bound<&[u8]>) -> StorageResult<Vec<KeyValue>> {
        if is_degenerate(start, end) {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().map_err(|e| engine_error("begin read", e))?;
        let table = txn.open_table(ENTRIES).map_err(|e| engine_error("open table", e))?;

        let mut results = Vec::new();
        for entry in table.range::<&[u8]>((start, end)).map_err(|e| engine_error("range", e))? {
            let (key, value) = entry.map_err(|e| engine_error("range", e))?;
            results.push(KeyValue::new(
                Bytes::copy_from_slice(key.value()),
                Bytes::copy_from_slice(value.value()),
            ));
        }
        Ok(results)
    }

    fn write_batch(&self, writes: &PendingWrites) -> StorageResult<()> {
        let txn = self.db.begin_write().map_err(|e| engine_error("begin write", e))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(|e| engine_error("open table", e))?;
            for (key, value) in writes {
                match value {
                    Some(v) => {
                        table.insert(key.as_slice(), v.as_slice()).map_err(|e| engine_error("insert", e))?;
                    },
                    None => {
                        table.remove(key.as_slice()).map_err(|e| engine_error("remove", e))?;
                    },
                }
            }
        }
        txn.commit().map_err(|e| engine_error("commit", e))
    }

    /// Validates `reads` against commits after `start`, then durably applies
    /// `writes`. Both happen under the commit log lock.
    fn commit_writes(
        &self,
        validate: Option<(u64, &ReadSet)>,
        writes: PendingWrites,
    ) -> StorageResult<()> {
        let mut log = self.commits.lock();

        if let Some((start, reads)) = validate
            && log.invalidates(start, reads)
        {
            tracing::debug!(
                read_keys = reads.keys.len(),
                read_ranges = reads.ranges.len(),
                "a concurrent commit wrote into the read set, rejecting commit"
            );
            return Err(StorageError::conflict());
        }
        if writes.is_empty() {
            return Ok(());
        }

        self.write_batch(&writes)?;
        log.record(writes.into_keys().collect());
        Ok(())
    }

    #[cfg(test)]
    fn retained_log_entries(&self) -> usize {
        self.commits.lock().entries.len()
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").field("metrics", &self.metrics).finish_non_exhaustive()
    }
}

impl MetricsCollector for RedbBackend {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let started = Instant::now();
        let value = self.read_value(key);
        self.metrics.record_get(started.elapsed());
        value
    }

    #[tracing::instrument(skip(self, key, value), fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let started = Instant::now();
        let result = self.commit_writes(None, BTreeMap::from([(key, Some(value))]));
        self.metrics.record_set(started.elapsed());
        result
    }

    #[tracing::instrument(skip(self, key), fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let started = Instant::now();
        let result = self.commit_writes(None, BTreeMap::from([(key.to_vec(), None)]));
        self.metrics.record_delete(started.elapsed());
        result
    }

    #[tracing::instrument(skip(self, range))]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let started = Instant::now();
        let results = self.scan(as_slice_bound(range.start_bound()), as_slice_bound(range.end_bound()));
        self.metrics.record_get_range(started.elapsed());
        results
    }

    #[tracing::instrument(skip(self))]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        let start = self.commits.lock().begin();
        Ok(Box::new(RedbTransaction {
            open: OpenTransaction { commits: Arc::clone(&self.commits), start },
            backend: self.clone(),
            pending_writes: PendingWrites::new(),
            reads: ReadSet::default(),
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        let txn = self.db.begin_read().map_err(|e| engine_error("begin read", e))?;
        txn.open_table(ENTRIES).map_err(|e| engine_error("open table", e))?;
        Ok(())
    }
}

/// Registration of an open transaction in the commit log, released on drop.
struct OpenTransaction {
    commits: Arc<Mutex<CommitLog>>,
    start: u64,
}

impl Drop for OpenTransaction {
    fn drop(&mut self) {
        self.commits.lock().finish(self.start);
    }
}

struct RedbTransaction {
    open: OpenTransaction,
    backend: RedbBackend,
    pending_writes: PendingWrites,
    reads: ReadSet,
}

impl RedbTransaction {
    /// Consumes the transaction; its commit log registration is released on
    /// return, after validation.
    fn validate_and_apply(self) -> StorageResult<()> {
        fail_point!("redb-before-commit", |_| Err(StorageError::conflict()));
        self.backend.commit_writes(Some((self.open.start, &self.reads)), self.pending_writes)
    }
}

#[async_trait]
impl Transaction for RedbTransaction {
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if let Some(value) = self.pending_writes.get(key) {
            return Ok(value.as_ref().map(|v| Bytes::copy_from_slice(v)));
        }

        self.reads.keys.insert(key.to_vec());
        self.backend.read_value(key)
    }

    async fn get_range(&mut self, range: KeyRange) -> StorageResult<Vec<KeyValue>> {
        let (start, end) = (as_slice_bound(range.0.as_ref()), as_slice_bound(range.1.as_ref()));

        let committed = self.backend.scan(start, end)?;
        let merged = overlay_pending(&committed, &self.pending_writes, start, end);
        self.reads.ranges.push(range);
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
