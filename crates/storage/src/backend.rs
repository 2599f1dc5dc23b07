//! The engine seam: a sorted, transactional byte keyspace.
//!
//! [`StorageBackend`] is all the namespace layer needs from an engine. Keys
//! and values are opaque bytes, range reads come back in byte order (so a
//! prefix scan is one contiguous range), and [`Transaction`] gives validated
//! read-modify-write. Account encoding and quotas are not the engine's
//! concern.
//!
//! A new engine supplies both traits and reports a stale read set at commit
//! as [`StorageError::Conflict`](crate::StorageError::Conflict). Everything
//! else it maps to [`StorageError::Internal`](crate::StorageError::Internal).
//! [`MemoryBackend`](crate::MemoryBackend) is the reference.

use std::ops::RangeBounds;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, transaction::Transaction, types::KeyValue};

/// A shared, sorted key-value engine.
///
/// One instance serves every caller concurrently. The single-shot methods
/// each run as their own implicit transaction; anything that must read and
/// then write consistently goes through [`transaction`](StorageBackend::transaction).
///
/// ```
/// use bytes::Bytes;
/// use tenantkv_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// assert_eq!(backend.get(b"key").await.unwrap(), Some(Bytes::from("value")));
///
/// backend.delete(b"key").await.unwrap();
/// assert_eq!(backend.get(b"key").await.unwrap(), None);
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads one key; `Ok(None)` when it is absent.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Removes a key. Removing an absent key succeeds.
    ///
    /// Callers that must tell "removed" from "already gone" check existence
    /// inside a [`Transaction`] first.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all key-value pairs within a range, in key order.
    ///
    /// An empty or inverted range returns an empty vector.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Starts a transaction over the current state of the keyspace.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Verifies that the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
