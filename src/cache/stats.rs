//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and tracked bytes, globally and per
//! category. The whole struct is the persisted statistics blob.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::CacheCategory;

/// Hit rate for a pair of counters, 0.0 when nothing was requested.
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Category Stats ==
/// Counters for a single category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Bytes currently tracked for this category
    pub current_size: u64,
}

impl CategoryStats {
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub total_hits: u64,
    /// Number of failed cache retrievals (absent, expired or undecodable)
    pub total_misses: u64,
    /// Number of entries removed by eviction, expiry or `remove`
    pub total_evictions: u64,
    /// Bytes tracked across both tiers
    pub total_size_bytes: u64,
    pub per_category: BTreeMap<CacheCategory, CategoryStats>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.total_hits, self.total_misses)
    }

    /// Counters for `category`, zero if it was never touched.
    pub fn category(&self, category: CacheCategory) -> CategoryStats {
        self.per_category.get(&category).copied().unwrap_or_default()
    }

    fn bucket(&mut self, category: CacheCategory) -> &mut CategoryStats {
        self.per_category.entry(category).or_default()
    }

    // == Record Hit ==
    pub fn record_hit(&mut self, category: CacheCategory) {
        self.total_hits += 1;
        self.bucket(category).hits += 1;
    }

    // == Record Miss ==
    pub fn record_miss(&mut self, category: CacheCategory) {
        self.total_misses += 1;
        self.bucket(category).misses += 1;
    }

    // == Record Eviction ==
    /// Counts an eviction and releases the entry's bytes.
    pub fn record_eviction(&mut self, category: CacheCategory, size_bytes: u64) {
        self.total_evictions += 1;
        self.bucket(category).evictions += 1;
        self.release(category, size_bytes);
    }

    // == Size Accounting ==
    pub fn add_size(&mut self, category: CacheCategory, size_bytes: u64) {
        self.total_size_bytes = self.total_size_bytes.saturating_add(size_bytes);
        let bucket = self.bucket(category);
        bucket.current_size = bucket.current_size.saturating_add(size_bytes);
    }

    /// Releases bytes without counting an eviction, clamped at zero.
    pub fn release(&mut self, category: CacheCategory, size_bytes: u64) {
        self.total_size_bytes = self.total_size_bytes.saturating_sub(size_bytes);
        let bucket = self.bucket(category);
        bucket.current_size = bucket.current_size.saturating_sub(size_bytes);
    }

    // == Reset ==
    /// Zeroes one category bucket, releasing its bytes from the global total.
    pub fn reset_category(&mut self, category: CacheCategory) {
        if let Some(bucket) = self.per_category.remove(&category) {
            self.total_size_bytes = self.total_size_bytes.saturating_sub(bucket.current_size);
        }
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Keeps the persisted counters but replaces every size with `sizes`.
    ///
    /// Used at startup, where the disk index is the authority on sizes.
    pub fn rebase_sizes(&mut self, sizes: &BTreeMap<CacheCategory, u64>) {
        self.total_size_bytes = 0;
        for bucket in self.per_category.values_mut() {
            bucket.current_size = 0;
        }
        for (category, size) in sizes {
            self.add_size(*category, *size);
        }
    }
}
