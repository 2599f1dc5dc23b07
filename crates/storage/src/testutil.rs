//! Helpers shared by the tests of this crate and of crates built on it.
//!
//! Compiled only with the `testutil` feature (or under `cfg(test)`):
//!
//! ```toml
//! [dev-dependencies]
//! tenantkv-storage = { workspace = true, features = ["testutil"] }
//! ```

use crate::{MemoryBackend, StorageBackend, error::StorageResult, types::prefix_range};

/// Builds the key `"{prefix}:{idx:06}"`.
///
/// Zero padding keeps byte order equal to numeric order.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> Vec<u8> {
    format!("{prefix}:{idx:06}").into_bytes()
}

/// A value of `size` bytes, all `0xAB`.
#[must_use]
pub fn make_value(size: usize) -> Vec<u8> {
    vec![0xAB; size]
}

/// A fresh [`MemoryBackend`] holding `count` keys made by [`make_key`].
///
/// # Panics
///
/// Panics if a write fails.
pub async fn populated_backend(prefix: &str, count: usize, value_size: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    let value = make_value(value_size);
    for idx in 0..count {
        backend.set(make_key(prefix, idx), value.clone()).await.expect("seeding write failed");
    }
    backend
}

/// Raw keys stored under `prefix`, in byte order.
///
/// Lets tests look past a higher layer's encoding at what actually landed in
/// the engine.
///
/// # Panics
///
/// Panics if the scan fails.
pub async fn keys_with_prefix(backend: &MemoryBackend, prefix: &[u8]) -> Vec<Vec<u8>> {
    let entries = backend.get_range(prefix_range(prefix)).await.expect("prefix scan failed");
    entries.into_iter().map(|kv| kv.key.to_vec()).collect()
}

/// Returns `true` if the result is a commit conflict.
pub fn is_conflict<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(err) if err.is_conflict())
}

/// Asserts that a [`StorageResult`] is [`StorageError::Conflict`](crate::StorageError::Conflict).
///
/// An optional second argument labels the failure message.
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        $crate::assert_conflict!($result, "")
    };
    ($result:expr, $label:expr) => {{
        let result = $result;
        if !$crate::testutil::is_conflict(&result) {
            panic!("{}expected a commit conflict, got: {:?}", $label, result);
        }
    }};
}

/// Unwraps an `Ok` [`StorageResult`], panicking with the error otherwise.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok, got storage error: {err:?}"),
        }
    };
}
