//! Error types for namespace operations and configuration.

use tenantkv_storage::StorageError;
use thiserror::Error;

/// Result type alias for namespace operations.
pub type Result<T> = std::result::Result<T, NamespaceError>;

/// Errors returned by [`NamespaceStore`](crate::NamespaceStore) operations.
///
/// The set is closed: callers can match it exhaustively. Engine failures
/// keep their [`StorageError`] as the error source.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// The value is larger than the configured per-value limit.
    #[error("value of {size} bytes exceeds the limit of {limit} bytes")]
    DataTooBig {
        /// Size of the rejected value in bytes.
        size: u64,
        /// Configured maximum value size in bytes.
        limit: u64,
    },

    /// Inserting a new key would exceed the account's key limit.
    #[error("account already holds the maximum of {limit} keys")]
    KeyLimitReached {
        /// Configured maximum number of keys per account.
        limit: u64,
    },

    /// The logical key does not exist in the account's namespace.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The logical key that was looked up.
        key: String,
    },

    /// The storage engine failed.
    #[error("storage engine error")]
    Engine(#[from] StorageError),
}

/// Coarse classification of a [`NamespaceError`].
///
/// Lets a transport layer map errors to responses without inspecting engine
/// details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`NamespaceError::DataTooBig`].
    DataTooBig,
    /// See [`NamespaceError::KeyLimitReached`].
    KeyLimitReached,
    /// See [`NamespaceError::KeyNotFound`].
    KeyNotFound,
    /// Any engine failure.
    Internal,
}

impl NamespaceError {
    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataTooBig { .. } => ErrorKind::DataTooBig,
            Self::KeyLimitReached { .. } => ErrorKind::KeyLimitReached,
            Self::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            Self::Engine(_) => ErrorKind::Internal,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Smallest allowed value.
        min: String,
        /// The rejected value.
        value: String,
    },

    /// Two values contradict each other.
    #[error("{field} is invalid: {reason}")]
    Inconsistent {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
