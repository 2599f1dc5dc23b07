//! Storage metrics collection.
//!
//! Counts operations, cumulative latencies, commit conflicts and conflict
//! retries for a storage backend and the layers built on it.
//!
//! All atomics use `Ordering::Relaxed`: each counter is independent and only
//! ever incremented or reset, so a snapshot may be slightly skewed between
//! counters but never torn.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use tenantkv_storage::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.record_get(Duration::from_micros(100));
//! metrics.record_transaction(Duration::from_micros(300));
//! metrics.record_conflict();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.get_count, 1);
//! assert_eq!(snapshot.avg_get_latency_us(), 100.0);
//! assert_eq!(snapshot.conflict_rate(), 1.0);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::warn;

/// Point-in-time copy of all counters in a [`Metrics`] collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Number of point reads.
    pub get_count: u64,
    /// Number of writes.
    pub set_count: u64,
    /// Number of deletes.
    pub delete_count: u64,
    /// Number of range scans.
    pub get_range_count: u64,
    /// Number of commit attempts.
    pub transaction_count: u64,
    /// Cumulative point-read latency in microseconds.
    pub get_latency_us: u64,
    /// Cumulative write latency in microseconds.
    pub set_latency_us: u64,
    /// Cumulative delete latency in microseconds.
    pub delete_latency_us: u64,
    /// Cumulative range-scan latency in microseconds.
    pub get_range_latency_us: u64,
    /// Cumulative commit latency in microseconds.
    pub transaction_latency_us: u64,
    /// Commits rejected by read-set validation.
    pub conflict_count: u64,
    /// Transaction reruns triggered by a conflict.
    pub retry_count: u64,
    /// Operations that gave up after exhausting the retry budget.
    pub retry_exhausted_count: u64,
}

fn avg(total_us: u64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total_us as f64 / count as f64 }
}

impl MetricsSnapshot {
    /// Average point-read latency in microseconds.
    #[must_use]
    pub fn avg_get_latency_us(&self) -> f64 {
        avg(self.get_latency_us, self.get_count)
    }

    /// Average write latency in microseconds.
    #[must_use]
    pub fn avg_set_latency_us(&self) -> f64 {
        avg(self.set_latency_us, self.set_count)
    }

    /// Average delete latency in microseconds.
    #[must_use]
    pub fn avg_delete_latency_us(&self) -> f64 {
        avg(self.delete_latency_us, self.delete_count)
    }

    /// Average range-scan latency in microseconds.
    #[must_use]
    pub fn avg_get_range_latency_us(&self) -> f64 {
        avg(self.get_range_latency_us, self.get_range_count)
    }

    /// Average commit latency in microseconds.
    #[must_use]
    pub fn avg_transaction_latency_us(&self) -> f64 {
        avg(self.transaction_latency_us, self.transaction_count)
    }

    /// Fraction of commit attempts rejected with a conflict.
    #[must_use]
    pub fn conflict_rate(&self) -> f64 {
        if self.transaction_count == 0 {
            0.0
        } else {
            self.conflict_count as f64 / self.transaction_count as f64
        }
    }

    /// Total number of recorded operations.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.get_count
            + self.set_count
            + self.delete_count
            + self.get_range_count
            + self.transaction_count
    }
}

/// Collects operation counts, latencies and conflict statistics.
///
/// Cheaply cloneable; clones share the same counters.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    get_count: AtomicU64,
    set_count: AtomicU64,
    delete_count: AtomicU64,
    get_range_count: AtomicU64,
    transaction_count: AtomicU64,

    get_latency_us: AtomicU64,
    set_latency_us: AtomicU64,
    delete_latency_us: AtomicU64,
    get_range_latency_us: AtomicU64,
    transaction_latency_us: AtomicU64,

    conflict_count: AtomicU64,
    retry_count: AtomicU64,
    retry_exhausted_count: AtomicU64,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").field("snapshot", &self.snapshot()).finish()
    }
}

fn add(counter: &AtomicU64, latency: &AtomicU64, duration: Duration) {
    counter.fetch_add(1, Ordering::Relaxed);
    latency.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
}

impl Metrics {
    /// Creates a new metrics collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a point read.
    pub fn record_get(&self, duration: Duration) {
        add(&self.inner.get_count, &self.inner.get_latency_us, duration);
    }

    /// Records a write.
    pub fn record_set(&self, duration: Duration) {
        add(&self.inner.set_count, &self.inner.set_latency_us, duration);
    }

    /// Records a delete.
    pub fn record_delete(&self, duration: Duration) {
        add(&self.inner.delete_count, &self.inner.delete_latency_us, duration);
    }

    /// Records a range scan.
    pub fn record_get_range(&self, duration: Duration) {
        add(&self.inner.get_range_count, &self.inner.get_range_latency_us, duration);
    }

    /// Records a commit attempt, successful or not.
    pub fn record_transaction(&self, duration: Duration) {
        add(&self.inner.transaction_count, &self.inner.transaction_latency_us, duration);
    }

    /// Records a commit rejected by read-set validation.
    pub fn record_conflict(&self) {
        self.inner.conflict_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one rerun of a transaction after a conflict.
    pub fn record_retry(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation that ran out of conflict retries.
    pub fn record_retry_exhausted(&self) {
        self.inner.retry_exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let inner = &self.inner;
        MetricsSnapshot {
            get_count: load(&inner.get_count),
            set_count: load(&inner.set_count),
            delete_count: load(&inner.delete_count),
            get_range_count: load(&inner.get_range_count),
            transaction_count: load(&inner.transaction_count),
            get_latency_us: load(&inner.get_latency_us),
            set_latency_us: load(&inner.set_latency_us),
            delete_latency_us: load(&inner.delete_latency_us),
            get_range_latency_us: load(&inner.get_range_latency_us),
            transaction_latency_us: load(&inner.transaction_latency_us),
            conflict_count: load(&inner.conflict_count),
            retry_count: load(&inner.retry_count),
            retry_exhausted_count: load(&inner.retry_exhausted_count),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.get_count,
            &inner.set_count,
            &inner.delete_count,
            &inner.get_range_count,
            &inner.transaction_count,
            &inner.get_latency_us,
            &inner.set_latency_us,
            &inner.delete_latency_us,
            &inner.get_range_latency_us,
            &inner.transaction_latency_us,
            &inner.conflict_count,
            &inner.retry_count,
            &inner.retry_exhausted_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Logs current metrics at INFO level, warning on a high conflict rate.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        if snapshot.total_operations() == 0 {
            return;
        }

        tracing::info!(
            get_count = snapshot.get_count,
            set_count = snapshot.set_count,
            delete_count = snapshot.delete_count,
            get_range_count = snapshot.get_range_count,
            transaction_count = snapshot.transaction_count,
            avg_get_latency_us = snapshot.avg_get_latency_us(),
            avg_get_range_latency_us = snapshot.avg_get_range_latency_us(),
            avg_transaction_latency_us = snapshot.avg_transaction_latency_us(),
            conflict_count = snapshot.conflict_count,
            conflict_rate = snapshot.conflict_rate(),
            retry_count = snapshot.retry_count,
            retry_exhausted_count = snapshot.retry_exhausted_count,
            "Storage metrics snapshot"
        );

        if snapshot.conflict_rate() > 0.10 {
            warn!(
                conflict_rate = snapshot.conflict_rate(),
                conflict_count = snapshot.conflict_count,
                transaction_count = snapshot.transaction_count,
                "High transaction conflict rate detected"
            );
        }
    }
}

/// Exposes the [`Metrics`] instance for a storage backend.
pub trait MetricsCollector {
    /// Returns a reference to the backend's metrics collector.
    fn metrics(&self) -> &Metrics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert_eq!(snapshot.total_operations(), 0);
        assert_eq!(snapshot.conflict_rate(), 0.0);
        assert_eq!(snapshot.avg_set_latency_us(), 0.0);
    }

    #[test]
    fn records_counts_and_latency() {
        let metrics = Metrics::new();
        metrics.record_set(Duration::from_micros(100));
        metrics.record_set(Duration::from_micros(300));
        metrics.record_delete(Duration::from_micros(50));
        metrics.record_get_range(Duration::from_micros(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.set_count, 2);
        assert_eq!(snapshot.avg_set_latency_us(), 200.0);
        assert_eq!(snapshot.avg_delete_latency_us(), 50.0);
        assert_eq!(snapshot.total_operations(), 4);
    }

    #[test]
    fn conflict_rate_is_relative_to_commits() {
        let metrics = Metrics::new();
        for _ in 0..4 {
            metrics.record_transaction(Duration::from_micros(1));
        }
        metrics.record_conflict();

        assert_eq!(metrics.snapshot().conflict_rate(), 0.25);
    }

    #[test]
    fn clones_share_counters_and_reset_clears_them() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_retry();
        clone.record_retry_exhausted();

        assert_eq!(metrics.snapshot().retry_count, 1);
        assert_eq!(metrics.snapshot().retry_exhausted_count, 1);

        metrics.reset();
        assert_eq!(clone.snapshot(), MetricsSnapshot::default());
    }
}
