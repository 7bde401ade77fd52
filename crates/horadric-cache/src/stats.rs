//! Cache statistics
//!
//! Counters are atomics so a snapshot never has to wait on the cache lock
//! for the hit/miss figures.

#![allow(clippy::cast_precision_loss)] // Hit rate accepts precision loss

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cache statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cache name from its configuration
    pub name: String,
    /// Successful retrievals
    pub hit_count: u64,
    /// Retrievals of absent keys
    pub miss_count: u64,
    /// Accepted inserts
    pub insert_count: u64,
    /// Entries evicted to stay within budget
    pub eviction_count: u64,
    /// Live entries
    pub entry_count: usize,
    /// Sum of the weights of live entries
    pub total_weight: u64,
    /// Configured weight budget
    pub budget: u64,
}

impl CacheStats {
    /// Hits over total retrievals
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    /// Total weight over budget
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.budget == 0 {
            0.0
        } else {
            self.total_weight as f64 / self.budget as f64
        }
    }
}

/// Thread-safe counters backing [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct CacheMetrics {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    insert_count: AtomicU64,
    eviction_count: AtomicU64,
}

impl CacheMetrics {
    #[inline]
    pub(crate) fn record_retrieve(&self, hit: bool) {
        if hit {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_insert(&self) {
        self.insert_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        name: &str,
        entry_count: usize,
        total_weight: u64,
        budget: u64,
    ) -> CacheStats {
        CacheStats {
            name: name.to_string(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            insert_count: self.insert_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            entry_count,
            total_weight,
            budget,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::default();
        assert!(metrics.snapshot("t", 0, 0, 1).hit_rate().abs() < f64::EPSILON);

        metrics.record_retrieve(true);
        metrics.record_retrieve(true);
        metrics.record_retrieve(true);
        metrics.record_retrieve(false);
        let stats = metrics.snapshot("t", 0, 0, 1);
        assert_eq!(stats.hit_count, 3);
        assert_eq!(stats.miss_count, 1);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_utilization() {
        let metrics = CacheMetrics::default();
        let stats = metrics.snapshot("t", 2, 50, 200);
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
    }
}
