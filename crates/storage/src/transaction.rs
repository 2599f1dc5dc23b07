//! Transaction trait for atomic storage operations.
//!
//! # Transaction Semantics
//!
//! Transactions provide:
//! - **Atomicity**: All buffered writes are applied together at commit, or not at all
//! - **Read-your-writes**: Reads within a transaction see pending writes
//! - **Serializable commits**: Everything the transaction read is re-validated at commit time;
//!   if any of it changed, the commit fails with [`StorageError::Conflict`]
//! - **Abort by drop**: Dropping an uncommitted transaction discards its writes
//!
//! [`StorageError::Conflict`]: crate::StorageError::Conflict
//!
//! # Example
//!
//! ```
//! use tenantkv_storage::{MemoryBackend, StorageBackend, prefix_range};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! backend.set(b"acct:a".to_vec(), b"1".to_vec()).await.unwrap();
//!
//! // Read a whole prefix, then write based on what was seen.
//! let mut txn = backend.transaction().await.unwrap();
//! let existing = txn.get_range(prefix_range(b"acct:")).await.unwrap();
//! if existing.len() < 2 {
//!     txn.set(b"acct:b".to_vec(), b"2".to_vec());
//! }
//! txn.commit().await.unwrap();
//!
//! assert!(backend.get(b"acct:b").await.unwrap().is_some());
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::StorageResult,
    types::{KeyRange, KeyValue},
};

/// Transaction handle for atomic multi-operation commits.
///
/// A transaction buffers sets and deletes until [`commit`](Transaction::commit)
/// is called, at which point all of them are applied atomically.
///
/// # Concurrency
///
/// Transactions use optimistic concurrency control. Reads are recorded in a
/// read set; [`commit`](Transaction::commit) re-checks every recorded key and
/// range under the backend's write lock. If another transaction changed any
/// of them in between, the commit fails with
/// [`StorageError::Conflict`](crate::StorageError::Conflict) and the caller is
/// expected to rerun the whole read-modify-write cycle.
///
/// Transactions whose read sets do not overlap with other writers' keys
/// never conflict, so unrelated key ranges proceed independently.
#[async_trait]
pub trait Transaction: Send {
    /// Gets a value within the transaction.
    ///
    /// Pending writes of this transaction take precedence over committed
    /// data. Reads that reach committed data are recorded for commit-time
    /// validation.
    async fn get(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Retrieves all key-value pairs within a range, in key order.
    ///
    /// The result merges committed data with this transaction's pending
    /// writes and deletes. The observed committed range is recorded, so a
    /// concurrent insert or delete anywhere inside it causes a commit
    /// conflict (phantom protection).
    ///
    /// An empty or inverted range returns an empty vector.
    async fn get_range(&mut self, range: KeyRange) -> StorageResult<Vec<KeyValue>>;

    /// Buffers a set operation within the transaction.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers a delete operation within the transaction.
    ///
    /// Deleting an absent key is a no-op at commit time.
    fn delete(&mut self, key: Vec<u8>);

    /// Validates the read set and applies all buffered operations atomically.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if anything this transaction
    ///   read was modified by another commit after it was read
    /// - Other [`StorageError`](crate::StorageError) variants on backend failures
    ///
    /// This method consumes the transaction. After commit (successful or
    /// not) the transaction cannot be used further.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
