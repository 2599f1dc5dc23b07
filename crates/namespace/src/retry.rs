//! Retry logic for transactions that lose a commit race.
//!
//! [`with_conflict_retry`] reruns a whole read-check-write transaction when
//! its commit fails with [`StorageError::Conflict`]. The rerun reads fresh
//! state, so quota checks are always made against what is actually committed.
//! Any other error is returned immediately.
//!
//! # Backoff Strategy
//!
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added so that racing writers spread out

use std::{future::Future, time::Duration};

use fail::fail_point;
use rand::Rng;
use tenantkv_storage::{Metrics, StorageError};

use crate::config::ConflictRetryConfig;

/// Executes `operation`, rerunning it on commit conflicts.
///
/// Returns the first non-conflict outcome. When every attempt conflicts,
/// the last [`StorageError::Conflict`] is returned.
///
/// # Metrics
///
/// When `metrics` is provided, each rerun increments `retry_count` and an
/// exhausted budget increments `retry_exhausted_count`.
#[tracing::instrument(skip(config, metrics, operation), fields(max_retries = config.max_retries))]
pub async fn with_conflict_retry<F, Fut, T, E>(
    config: &ConflictRetryConfig,
    metrics: Option<&Metrics>,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: AsConflict,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) => err,
        };

        if !err.is_conflict() {
            return Err(err);
        }

        if attempt >= config.max_retries {
            if let Some(m) = metrics {
                m.record_retry_exhausted();
            }
            tracing::warn!(
                operation = operation_name,
                attempts = attempt + 1,
                "commit conflict persisted, giving up",
            );
            return Err(err);
        }

        if let Some(m) = metrics {
            m.record_retry();
        }
        let delay = compute_backoff(config, attempt);
        tracing::debug!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = config.max_retries + 1,
            delay_us = delay.as_micros() as u64,
            "commit conflict, retrying after backoff",
        );
        fail_point!("conflict-retry-before-sleep");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Errors that can report whether they are a retryable commit conflict.
pub trait AsConflict {
    /// Returns `true` if the failed attempt should be rerun.
    fn is_conflict(&self) -> bool;
}

impl AsConflict for StorageError {
    fn is_conflict(&self) -> bool {
        StorageError::is_conflict(self)
    }
}

impl AsConflict for crate::error::NamespaceError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Engine(e) if e.is_conflict())
    }
}

/// Computes the backoff duration for the given attempt number.
///
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..=50% of delay)`
fn compute_backoff(config: &ConflictRetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    // Conflict backoffs are short, so jitter is computed in microseconds
    let jitter_range = capped.as_micros() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_micros(jitter)
    } else {
        capped
    }
}
