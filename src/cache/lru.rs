//! LRU Eviction Module
//!
//! Plans which entries to evict given the live index and a budget. Planning
//! is pure; the store applies the plan to both tiers.

use std::collections::HashMap;

use crate::cache::{CacheBudget, CacheCategory};

// == Eviction Candidate ==
/// What the planner needs to know about one live entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub qualified_key: String,
    pub category: CacheCategory,
    pub size_bytes: u64,
    pub last_accessed_at: u64,
    /// Monotonic access sequence, breaks `last_accessed_at` ties
    pub sequence: u64,
}

// == Plan ==
/// Returns the qualified keys to evict, oldest access first.
///
/// Per-category quotas are applied first. Then, over what remains, the
/// count constraint and the size constraint each demand some number of the
/// oldest entries; the larger demand wins, capped at the number of entries.
///
/// # Arguments
/// * `candidates` - Every live entry, in any order
/// * `total_size` - Tracked bytes across both tiers
/// * `budget` - Global limits
pub fn plan_eviction(
    mut candidates: Vec<EvictionCandidate>,
    total_size: u64,
    budget: &CacheBudget,
) -> Vec<String> {
    candidates.sort_by_key(|c| (c.last_accessed_at, c.sequence));

    let mut per_category: HashMap<CacheCategory, usize> = HashMap::new();
    for candidate in &candidates {
        *per_category.entry(candidate.category).or_default() += 1;
    }

    // Oldest entries of over-quota categories go first
    let mut evicted = Vec::new();
    let mut size = total_size;
    let mut survivors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let count = per_category.entry(candidate.category).or_default();
        if *count > candidate.category.max_entries() {
            *count -= 1;
            size = size.saturating_sub(candidate.size_bytes);
            evicted.push(candidate.qualified_key);
        } else {
            survivors.push(candidate);
        }
    }

    let total_entries = survivors.len();
    let remove_for_count = total_entries.saturating_sub(budget.max_entries);

    let mut remove_for_size = 0;
    let mut removed_bytes = 0u64;
    for candidate in &survivors {
        if size.saturating_sub(removed_bytes) <= budget.max_memory_bytes {
            break;
        }
        removed_bytes += candidate.size_bytes;
        remove_for_size += 1;
    }

    let remove = remove_for_count.max(remove_for_size).min(total_entries);
    evicted.extend(
        survivors
            .into_iter()
            .take(remove)
            .map(|candidate| candidate.qualified_key),
    );
    evicted
}
