//! Cache Statistics
//!
//! Lock-free counters updated on the invocation path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-cache statistics collector
#[derive(Debug, Default)]
pub struct CacheStats {
    // Reads
    hits: AtomicU64,
    misses: AtomicU64,

    // Writes
    stores: AtomicU64,
    removals: AtomicU64,

    // Cluster
    cluster_loads: AtomicU64,
    cluster_load_misses: AtomicU64,
    replications: AtomicU64,
}

impl CacheStats {
    /// Create a new statistics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cluster_load(&self) {
        self.cluster_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cluster_load_miss(&self) {
        self.cluster_load_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replication(&self) {
        self.replications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            stores: self.stores.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            cluster_loads: self.cluster_loads.load(Ordering::Relaxed),
            cluster_load_misses: self.cluster_load_misses.load(Ordering::Relaxed),
            replications: self.replications.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.stores,
            &self.removals,
            &self.cluster_loads,
            &self.cluster_load_misses,
            &self.replications,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of all cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub stores: u64,
    pub removals: u64,
    pub cluster_loads: u64,
    pub cluster_load_misses: u64,
    pub replications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_tracking() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hits(), 2);
        assert!((stats.hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let stats = CacheStats::new();
        stats.record_store();
        stats.record_cluster_load();
        stats.record_replication();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.stores, 1);
        assert_eq!(snapshot.cluster_loads, 1);
        assert_eq!(snapshot.replications, 1);

        stats.reset();
        assert_eq!(stats.snapshot().stores, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CacheStats::new();
        stats.record_removal();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["removals"], 1);
        assert_eq!(json["cluster_load_misses"], 0);
    }
}
