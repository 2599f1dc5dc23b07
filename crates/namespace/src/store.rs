//! Per-account key-value namespaces over a shared [`StorageBackend`].
//!
//! Every operation runs in its own engine transaction. Writes that depend on
//! what they read (the key-count quota, delete's existence check) are rerun
//! from scratch when their commit loses a race, so quota decisions are always
//! made against committed state.

use tenantkv_storage::{KeyValue, Metrics, MetricsCollector, StorageBackend, prefix_range};

use crate::{
    config::{ConflictRetryConfig, QuotaConfig},
    error::{NamespaceError, Result},
    keys::{decode_logical_key, encode_physical_key, namespace_prefix},
    retry::with_conflict_retry,
};

/// Isolated key-value namespaces, one per account, in a shared store.
///
/// The store holds no locks and no cache; all state lives in the backend.
/// Clone the backend (or wrap the store in an `Arc`) to share it between
/// tasks.
///
/// # Example
///
/// ```
/// use tenantkv_namespace::{NamespaceStore, QuotaConfig};
/// use tenantkv_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = NamespaceStore::new(MemoryBackend::new());
/// let quota = QuotaConfig::builder().max_keys_per_account(10).build();
///
/// let physical = store.insert("alice", "color", b"blue", &quota).await.unwrap();
/// assert_eq!(physical, "YWxpY2U=-store-Y29sb3I=");
///
/// assert_eq!(store.retrieve("alice", "color").await.unwrap(), b"blue");
/// assert_eq!(store.list("alice").await.unwrap(), vec!["color".to_string()]);
/// assert!(store.list("bob").await.unwrap().is_empty());
/// # });
/// ```
pub struct NamespaceStore<B> {
    backend: B,
    retry: ConflictRetryConfig,
    metrics: Metrics,
}

impl<B: StorageBackend> NamespaceStore<B> {
    /// Creates a store with the default conflict retry policy.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_retry_config(backend, ConflictRetryConfig::default())
    }

    /// Creates a store with an explicit conflict retry policy.
    #[must_use]
    pub fn with_retry_config(backend: B, retry: ConflictRetryConfig) -> Self {
        Self { backend, retry, metrics: Metrics::new() }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Stores `value` under `key` in `account`'s namespace.
    ///
    /// Overwrites an existing value. Returns the physical key the value was
    /// stored under.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::DataTooBig`] if the value exceeds the size limit; nothing is read or
    ///   written in that case
    /// - [`NamespaceError::KeyLimitReached`] if `key` is new and the account already holds the
    ///   maximum number of keys. Overwriting an existing key is never refused by this quota.
    /// - [`NamespaceError::Engine`] on storage failures, including a conflict that persisted
    ///   through every retry
    #[tracing::instrument(
        skip(self, account, key, value, quota),
        fields(account_len = account.len(), key_len = key.len(), value_len = value.len())
    )]
    pub async fn insert(
        &self,
        account: &str,
        key: &str,
        value: &[u8],
        quota: &QuotaConfig,
    ) -> Result<String> {
        let size = value.len() as u64;
        if let Some(limit) = quota.value_size_limit()
            && size > limit
        {
            return Err(NamespaceError::DataTooBig { size, limit });
        }

        let physical = encode_physical_key(account, key);
        let prefix = namespace_prefix(account);

        with_conflict_retry(&self.retry, Some(&self.metrics), "insert", || {
            self.try_insert(&prefix, &physical, value, quota)
        })
        .await
        .inspect_err(log_engine_failure)?;

        Ok(physical)
    }

    async fn try_insert(
        &self,
        prefix: &str,
        physical: &str,
        value: &[u8],
        quota: &QuotaConfig,
    ) -> Result<()> {
        let mut txn = self.backend.transaction().await?;

        let exists = txn.get(physical.as_bytes()).await?.is_some();
        if !exists && let Some(limit) = quota.key_limit() {
            let entries = txn.get_range(prefix_range(prefix.as_bytes())).await?;
            let count = logical_keys(&entries).len() as u64;
            if count >= limit {
                tracing::debug!(count, limit, "key limit reached");
                return Err(NamespaceError::KeyLimitReached { limit });
            }
        }

        txn.set(physical.as_bytes().to_vec(), value.to_vec());
        txn.commit().await?;
        Ok(())
    }

    /// Returns a copy of the value stored under `key` in `account`'s namespace.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::KeyNotFound`] if the key does not exist
    /// - [`NamespaceError::Engine`] on storage failures
    #[tracing::instrument(skip(self, account, key), fields(account_len = account.len(), key_len = key.len()))]
    pub async fn retrieve(&self, account: &str, key: &str) -> Result<Vec<u8>> {
        let physical = encode_physical_key(account, key);

        let value = async {
            let mut txn = self.backend.transaction().await?;
            Ok::<_, NamespaceError>(txn.get(physical.as_bytes()).await?)
        }
        .await
        .inspect_err(log_engine_failure)?;

        match value {
            Some(value) => Ok(value.to_vec()),
            None => Err(NamespaceError::KeyNotFound { key: key.to_owned() }),
        }
    }

    /// Removes `key` from `account`'s namespace.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::KeyNotFound`] if the key does not exist
    /// - [`NamespaceError::Engine`] on storage failures
    #[tracing::instrument(skip(self, account, key), fields(account_len = account.len(), key_len = key.len()))]
    pub async fn delete(&self, account: &str, key: &str) -> Result<()> {
        let physical = encode_physical_key(account, key);

        with_conflict_retry(&self.retry, Some(&self.metrics), "delete", || {
            self.try_delete(key, &physical)
        })
        .await
        .inspect_err(log_engine_failure)
    }

    async fn try_delete(&self, key: &str, physical: &str) -> Result<()> {
        let mut txn = self.backend.transaction().await?;

        if txn.get(physical.as_bytes()).await?.is_none() {
            return Err(NamespaceError::KeyNotFound { key: key.to_owned() });
        }

        txn.delete(physical.as_bytes().to_vec());
        txn.commit().await?;
        Ok(())
    }

    /// Lists the logical keys in `account`'s namespace.
    ///
    /// Keys come back in the byte order of their encoded form, which is
    /// neither insertion order nor the order of the logical keys. Entries
    /// whose physical key cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::Engine`] on storage failures
    #[tracing::instrument(skip(self, account), fields(account_len = account.len()))]
    pub async fn list(&self, account: &str) -> Result<Vec<String>> {
        let prefix = namespace_prefix(account);

        let entries = async {
            let mut txn = self.backend.transaction().await?;
            Ok::<_, NamespaceError>(txn.get_range(prefix_range(prefix.as_bytes())).await?)
        }
        .await
        .inspect_err(log_engine_failure)?;

        Ok(logical_keys(&entries))
    }
}

/// Engine failures reach callers only as [`ErrorKind::Internal`](crate::ErrorKind::Internal),
/// so their detail is logged here.
fn log_engine_failure(err: &NamespaceError) {
    if let NamespaceError::Engine(source) = err {
        tracing::error!(error = %source, "storage engine failure");
    }
}

impl<B> MetricsCollector for NamespaceStore<B> {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl<B> std::fmt::Debug for NamespaceStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceStore").field("retry", &self.retry).finish_non_exhaustive()
    }
}

/// Decodes the logical keys of a namespace scan, skipping undecodable entries.
fn logical_keys(entries: &[KeyValue]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|kv| match decode_logical_key(&kv.key) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(
                    physical_key_len = kv.key.len(),
                    error = %err,
                    "skipping undecodable key in namespace",
                );
                None
            },
        })
        .collect()
}
