//! Per-account key-value namespaces with quotas over a shared transactional store.
//!
//! Each account owns an isolated namespace of string keys mapping to opaque
//! byte values. All namespaces share one sorted keyspace provided by a
//! [`StorageBackend`](tenantkv_storage::StorageBackend); isolation comes
//! purely from the physical key layout described in [`keys`]. Use
//! [`RedbBackend`](tenantkv_storage::RedbBackend) for a durable store and
//! [`MemoryBackend`](tenantkv_storage::MemoryBackend) in tests.
//!
//! # Quick Start
//!
//! ```
//! use tenantkv_namespace::{ErrorKind, NamespaceStore, QuotaConfig};
//! use tenantkv_storage::MemoryBackend;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = NamespaceStore::new(MemoryBackend::new());
//!     let quota = QuotaConfig::builder().max_keys_per_account(1).build();
//!
//!     store.insert("alice", "theme", b"dark", &quota).await?;
//!
//!     // Overwrites are allowed even at the key limit
//!     store.insert("alice", "theme", b"light", &quota).await?;
//!
//!     let err = store.insert("alice", "lang", b"en", &quota).await.unwrap_err();
//!     assert_eq!(err.kind(), ErrorKind::KeyLimitReached);
//!
//!     store.delete("alice", "theme").await?;
//!     assert!(store.list("alice").await?.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! Quota checks and the write they guard run in one transaction. When two
//! writers race for the last free slot of an account, the engine rejects the
//! later commit and [`with_conflict_retry`] reruns it against fresh state,
//! where the quota check then fails. Different accounts never conflict.
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Compiles the `conflict-retry-before-sleep` fail point and the storage
//!   crate's commit fail point.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod keys;
pub mod retry;
pub mod store;

pub use config::{ConflictRetryConfig, NamespaceConfig, QuotaConfig};
pub use error::{ConfigError, ErrorKind, NamespaceError, Result};
pub use keys::KeyDecodeError;
pub use retry::{AsConflict, with_conflict_retry};
pub use store::NamespaceStore;
