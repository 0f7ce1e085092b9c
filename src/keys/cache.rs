//! In-process memo for key material and pepper lookups.
//!
//! Store reads are remote calls, so the latest value read for a name is kept
//! here. Every write path on the owning component invalidates the entry before
//! returning, so later reads in the same process never see stale material.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

// =============================================================================
// Cache Statistics
// =============================================================================

/// Statistics for a lookup cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: AtomicU64,

    /// Total number of cache misses
    pub misses: AtomicU64,

    /// Total number of values inserted
    pub inserts: AtomicU64,

    /// Total number of entries dropped by invalidation
    pub invalidations: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub invalidations: u64,
}

// =============================================================================
// Lookup Cache
// =============================================================================

/// Named-value memo with explicit invalidation.
pub struct LookupCache<V> {
    entries: DashMap<String, V>,
    stats: CacheStats,
}

impl<V: Clone> LookupCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached value, recording a hit or miss.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value().clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
        self.stats.record_insert();
    }

    /// Drop one entry. Returns whether anything was cached under `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.record_invalidations(1);
        }
        removed
    }

    pub fn invalidate_all(&self) {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.stats.record_invalidations(count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl<V: Clone> Default for LookupCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
