//! Configuration for namespace quotas and conflict retries.
//!
//! [`QuotaConfig`] is passed to every insert; [`ConflictRetryConfig`] is
//! fixed when a [`NamespaceStore`](crate::NamespaceStore) is built.
//! [`NamespaceConfig`] bundles both in the shape of a service configuration
//! file:
//!
//! ```
//! use std::time::Duration;
//! use tenantkv_namespace::NamespaceConfig;
//!
//! let config: NamespaceConfig = serde_json::from_str(
//!     r#"{
//!         "storageOptions": { "maxKeysPerAccount": 100, "maxValueSizeBytes": 4096 },
//!         "conflictRetry": { "max_retries": 4, "initial_backoff": "5ms" }
//!     }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.storage_options.key_limit(), Some(100));
//! assert_eq!(config.conflict_retry.initial_backoff, Duration::from_millis(5));
//! assert_eq!(config.conflict_retry.max_backoff, Duration::from_millis(100));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of reruns of a conflicting transaction.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Default delay before the first rerun.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(2);

/// Default cap on the delay between reruns.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Per-account storage quotas. A limit of `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuotaConfig {
    /// Maximum number of keys one account may hold.
    #[serde(default)]
    #[builder(default)]
    pub max_keys_per_account: u64,

    /// Maximum size of a single value in bytes.
    #[serde(default)]
    #[builder(default)]
    pub max_value_size_bytes: u64,
}

impl QuotaConfig {
    /// No limits at all.
    pub const UNLIMITED: Self = Self { max_keys_per_account: 0, max_value_size_bytes: 0 };

    /// Returns the key-count limit, or `None` when unlimited.
    #[must_use]
    pub fn key_limit(&self) -> Option<u64> {
        (self.max_keys_per_account > 0).then_some(self.max_keys_per_account)
    }

    /// Returns the value-size limit, or `None` when unlimited.
    #[must_use]
    pub fn value_size_limit(&self) -> Option<u64> {
        (self.max_value_size_bytes > 0).then_some(self.max_value_size_bytes)
    }
}

/// How often and how patiently to rerun a transaction that lost a commit race.
///
/// Delays grow as `initial_backoff * 2^attempt`, capped at `max_backoff`,
/// with up to 50% random jitter added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictRetryConfig {
    /// Number of reruns after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first rerun.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Upper bound for the delay between reruns.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl ConflictRetryConfig {
    /// Creates a validated retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Inconsistent`] if `max_backoff` is shorter than
    /// `initial_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries, initial_backoff, max_backoff };
        config.validate()?;
        Ok(config)
    }

    /// Checks a configuration obtained without the builder, e.g. by deserializing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Inconsistent`] if `max_backoff` is shorter than
    /// `initial_backoff`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Inconsistent {
                field: "max_backoff",
                reason: format!(
                    "{:?} is shorter than initial_backoff {:?}",
                    self.max_backoff, self.initial_backoff
                ),
            });
        }
        Ok(())
    }
}

/// Namespace settings as they appear in a service configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NamespaceConfig {
    /// Quotas applied to every insert.
    #[serde(default)]
    pub storage_options: QuotaConfig,

    /// Conflict retry policy of the store.
    #[serde(default)]
    pub conflict_retry: ConflictRetryConfig,
}
