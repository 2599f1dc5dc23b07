//! Transactional key-value storage abstraction for tenantkv.
//!
//! This crate provides the [`StorageBackend`] and [`Transaction`] traits that
//! the per-account namespace layer is built on, together with two
//! serializable backends: [`MemoryBackend`] for tests and development, and
//! the durable, file-backed [`RedbBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 tenantkv-namespace                          │
//! │     NamespaceStore: key codec, quotas, conflict retry       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 tenantkv-storage                            │
//! │          StorageBackend + Transaction traits                │
//! │    (get, set, delete, get_range, transaction, commit)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │        MemoryBackend          │        RedbBackend          │
//! │ (sorted map, read-set rescan) │ (redb file, commit log)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tenantkv_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"user:123".to_vec(), b"Alice".to_vec()).await?;
//!
//!     let value = backend.get(b"user:123").await?;
//!     assert_eq!(value.map(|b| b.to_vec()), Some(b"Alice".to_vec()));
//!
//!     // Use transactions for atomic operations
//!     let mut txn = backend.transaction().await?;
//!     txn.set(b"counter".to_vec(), b"1".to_vec());
//!     txn.set(b"updated".to_vec(), b"true".to_vec());
//!     txn.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. A failed commit caused by a
//! concurrent writer surfaces as [`StorageError::Conflict`]; callers rerun
//! the whole transaction when they see it.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with shared test helpers (key/value generators,
//!   backend factories, assertion macros). Enable this in `[dev-dependencies]` for integration
//!   tests.
//! - **`failpoints`**: Compiles the `memory-before-commit` and `redb-before-commit` fail points
//!   into backend commits.

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod redb_backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod transaction;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use metrics::{Metrics, MetricsCollector, MetricsSnapshot};
pub use redb_backend::RedbBackend;
pub use transaction::Transaction;
pub use types::{KeyRange, KeyValue, prefix_range};
