//! Engine error type.
//!
//! Backends report two kinds of failure: a commit rejected because its read
//! set went stale ([`StorageError::Conflict`]), and everything else. Only the
//! first is worth retrying.
//!
//! ```
//! use tenantkv_storage::{StorageError, StorageResult};
//!
//! fn commit_attempt(stale: bool) -> StorageResult<()> {
//!     if stale { Err(StorageError::Conflict) } else { Ok(()) }
//! }
//!
//! assert!(commit_attempt(true).unwrap_err().is_conflict());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A shared, boxed error kept as the `source` of a [`StorageError`].
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by a storage engine.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A key or range read by the transaction changed before it committed.
    ///
    /// Nothing from the rejected transaction is applied.
    #[error("transaction conflict")]
    Conflict,

    /// Any other engine failure.
    #[error("storage engine error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// Underlying cause, when the engine has one.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates an `Internal` error without a source.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates an `Internal` error wrapping `source`.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` for commit-time conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(StorageError::conflict().to_string(), "transaction conflict");
        assert_eq!(StorageError::internal("boom").to_string(), "storage engine error: boom");
    }

    #[test]
    fn only_conflict_is_retryable() {
        assert!(StorageError::conflict().is_conflict());
        assert!(!StorageError::internal("x").is_conflict());
    }

    #[test]
    fn source_survives_clone() {
        let err = StorageError::internal_with_source("write failed", std::io::Error::other("disk on fire"));
        let cloned = err.clone();
        assert_eq!(cloned.source().map(ToString::to_string).as_deref(), Some("disk on fire"));
        assert!(StorageError::internal("bare").source().is_none());
    }
}
