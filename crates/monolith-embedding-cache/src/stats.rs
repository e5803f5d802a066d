//! Telemetry counters for the embedding cache.

use serde::{Deserialize, Serialize};

/// Running counters collected by lookup and admission.
///
/// The two averages mirror the figures operators watch to size the index:
/// how many probes an insertion needs, and how many slots an eviction
/// touches (victim scan plus backward-shift compression).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Keys passed to lookup, including overflow keys.
    pub lookups: u64,
    /// Lookups that resolved to a cache row.
    pub hits: u64,
    /// Lookups that reached an empty slot.
    pub misses: u64,
    /// Lookups short-circuited because the key was out of range.
    pub overflow_lookups: u64,
    /// Keys inserted by admission. Warm-start preloads are not counted.
    pub admissions: u64,
    /// Admissions of a key that was already present.
    pub duplicate_admissions: u64,
    /// Stale slots evicted by admission.
    pub evictions: u64,
    /// Batch positions skipped because the index was full for that key.
    pub skipped_full: u64,
    /// Admissions rolled back because a bounded eviction scan found no
    /// stale slot.
    pub stalled_evictions: u64,
    /// Running average of probes per insertion.
    pub avg_insert_probes: f64,
    /// Running average of eviction scan plus compression length.
    pub avg_evict_length: f64,
}

impl CacheStats {
    /// Creates an empty set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&mut self, probes: usize) {
        self.admissions += 1;
        self.avg_insert_probes = running_average(self.avg_insert_probes, probes, self.admissions);
    }

    pub(crate) fn record_eviction(&mut self, length: usize) {
        self.evictions += 1;
        self.avg_evict_length = running_average(self.avg_evict_length, length, self.evictions);
    }

    /// Fraction of in-range lookups that hit, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let resolved = self.hits + self.misses;
        if resolved == 0 {
            return 0.0;
        }
        self.hits as f64 / resolved as f64
    }

    /// Resets every counter to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn running_average(average: f64, sample: usize, count: u64) -> f64 {
    average + (sample as f64 - average) / count as f64
}
