//! Cache Store Module
//!
//! The combined tier state: one canonical index of live entries, the disk
//! tier behind it, statistics and the active budget. Every method is
//! synchronous; `CacheManager` provides the locking and the async surface.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::lru::{plan_eviction, EvictionCandidate};
use crate::cache::{
    CacheBudget, CacheCategory, CacheEntry, CacheStats, Clock, DiskTier, EntryMeta,
};
use crate::error::Result;

// == Index Record ==
/// One live entry. The payload is resident in memory when `Some`; a
/// persisted entry may drop it and reload from disk on demand.
#[derive(Debug, Clone)]
struct IndexRecord {
    meta: EntryMeta,
    payload: Option<Arc<[u8]>>,
    persisted: bool,
    /// Recency tie-break, bumped on every hit
    sequence: u64,
    /// Fixed when the record is created; identifies it across lock releases
    generation: u64,
}

impl IndexRecord {
    fn new(meta: EntryMeta, payload: Option<Arc<[u8]>>, persisted: bool, sequence: u64) -> Self {
        Self {
            meta,
            payload,
            persisted,
            sequence,
            generation: sequence,
        }
    }

    fn served(&self, payload: Arc<[u8]>) -> CacheEntry {
        CacheEntry::from_parts(self.meta.clone(), payload).with_generation(self.generation)
    }
}

/// Result of a read-only lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Resident and unexpired; can be served without the write lock
    Resident(CacheEntry),
    /// Absent, expired or disk-only; needs [`CacheStore::resolve`]
    Unresolved,
}

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    /// Canonical index keyed by qualified key
    index: HashMap<String, IndexRecord>,
    disk: DiskTier,
    stats: CacheStats,
    budget: CacheBudget,
    /// Entries larger than this are also written to disk
    disk_threshold: usize,
    clock: Arc<dyn Clock>,
    next_sequence: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Builds the store over an opened disk tier: loads the statistics blob,
    /// indexes every blob header-only and enforces the budget.
    pub fn open(
        disk: DiskTier,
        budget: CacheBudget,
        disk_threshold: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = disk.load_statistics().unwrap_or_default();
        let mut store = Self {
            index: HashMap::new(),
            disk,
            stats,
            budget,
            disk_threshold,
            clock,
            next_sequence: 0,
        };

        let mut metas = store.disk.scan();
        metas.sort_by_key(|meta| meta.last_accessed_at());

        let mut sizes: BTreeMap<CacheCategory, u64> = BTreeMap::new();
        for meta in metas {
            *sizes.entry(meta.category()).or_default() += meta.size_bytes();
            let sequence = store.bump_sequence();
            store.index.insert(
                meta.qualified_key(),
                IndexRecord::new(meta, None, true, sequence),
            );
        }
        store.stats.rebase_sizes(&sizes);

        let evicted = store.enforce_budget();
        info!(
            entries = store.index.len(),
            size_bytes = store.stats.total_size_bytes,
            evicted,
            "Cache store opened"
        );
        store
    }

    fn bump_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Insert ==
    /// Stores an entry, replacing any previous one under the same qualified
    /// key, then runs the evictor.
    ///
    /// The entry lands in memory; it is also written to disk when larger than
    /// the threshold. A failed disk write leaves it memory-only.
    pub fn insert(&mut self, entry: CacheEntry) {
        let qualified_key = entry.meta().qualified_key();
        let category = entry.meta().category();

        if let Some(previous) = self.index.remove(&qualified_key) {
            self.stats.release(category, previous.meta.size_bytes());
            if previous.persisted {
                self.disk.remove(category, &qualified_key);
            }
        }

        let mut persisted = false;
        if entry.meta().size_bytes() > self.disk_threshold as u64 {
            match self.disk.write(&entry) {
                Ok(()) => persisted = true,
                Err(e) => warn!(key = %qualified_key, error = %e, "Disk write failed, keeping entry in memory only"),
            }
        }

        self.stats.add_size(category, entry.meta().size_bytes());
        let sequence = self.bump_sequence();
        let (meta, payload) = entry.into_parts();
        debug!(key = %qualified_key, size = meta.size_bytes(), persisted, "Stored entry");
        self.index.insert(
            qualified_key,
            IndexRecord::new(meta, Some(payload), persisted, sequence),
        );

        self.enforce_budget();
    }

    // == Lookup ==
    /// Read-only fast path: serves resident, unexpired entries.
    pub fn lookup(&self, category: CacheCategory, key: &str) -> Lookup {
        let now = self.now_ms();
        match self.index.get(&category.qualify(key)) {
            Some(record) if !record.meta.is_expired_at(now) => match &record.payload {
                Some(payload) => Lookup::Resident(record.served(payload.clone())),
                None => Lookup::Unresolved,
            },
            _ => Lookup::Unresolved,
        }
    }

    // == Resolve ==
    /// Full lookup: memory, then disk. Expired entries are evicted.
    ///
    /// Records a miss when nothing usable is found. A hit is recorded by the
    /// caller through [`CacheStore::record_hit`] once the payload decoded, or
    /// a miss through [`CacheStore::discard_undecodable`] if it did not.
    pub fn resolve(&mut self, category: CacheCategory, key: &str) -> Option<CacheEntry> {
        let qualified_key = category.qualify(key);
        let now = self.now_ms();

        if !self.index.contains_key(&qualified_key) {
            // Blob written outside this index, e.g. by a previous process
            if let Some(entry) = self.disk.load(category, &qualified_key) {
                self.stats.add_size(category, entry.meta().size_bytes());
                let sequence = self.bump_sequence();
                let (meta, payload) = entry.into_parts();
                self.index.insert(
                    qualified_key.clone(),
                    IndexRecord::new(meta, Some(payload), true, sequence),
                );
            }
        }

        let Some(record) = self.index.get(&qualified_key) else {
            self.stats.record_miss(category);
            return None;
        };

        if record.meta.is_expired_at(now) {
            debug!(key = %qualified_key, "Entry expired on read");
            self.evict_key(&qualified_key);
            self.stats.record_miss(category);
            return None;
        }

        if let Some(payload) = &record.payload {
            return Some(record.served(payload.clone()));
        }

        // Disk-only: load lazily and keep the payload resident
        match self.disk.load(category, &qualified_key) {
            Some(loaded) if loaded.meta().created_at() == record.meta.created_at() => {
                let payload = loaded.payload().clone();
                if let Some(record) = self.index.get_mut(&qualified_key) {
                    record.payload = Some(payload.clone());
                    return Some(record.served(payload));
                }
                None
            }
            _ => {
                // Blob vanished or was corrupt; the index entry goes with it
                if let Some(record) = self.index.remove(&qualified_key) {
                    self.stats.release(category, record.meta.size_bytes());
                    self.disk.remove(category, &qualified_key);
                }
                self.stats.record_miss(category);
                None
            }
        }
    }

    // == Record Hit ==
    /// Counts a hit for a served entry and replaces its record with a
    /// touched one, if the same record is still live.
    pub fn record_hit(&mut self, served: &CacheEntry) {
        let meta = served.meta();
        self.stats.record_hit(meta.category());
        let now = self.now_ms();
        let sequence = self.bump_sequence();
        if let Some(record) = self.index.get_mut(&meta.qualified_key()) {
            if record.generation == served.generation() {
                record.meta = record.meta.touched(now);
                record.sequence = sequence;
            }
        }
    }

    /// Drops an entry whose payload could not be decoded and counts a miss.
    /// A record stored since the entry was served is left alone.
    pub fn discard_undecodable(&mut self, served: &CacheEntry) {
        let qualified_key = served.meta().qualified_key();
        let category = served.meta().category();
        let same_entry = self
            .index
            .get(&qualified_key)
            .is_some_and(|record| record.generation == served.generation());
        if same_entry {
            warn!(key = %qualified_key, "Undecodable payload, discarding entry");
            if let Some(record) = self.index.remove(&qualified_key) {
                self.stats.release(category, record.meta.size_bytes());
                if record.persisted {
                    self.disk.remove(category, &qualified_key);
                }
            }
        }
        self.stats.record_miss(category);
    }

    // == Contains ==
    /// True only for a live, unexpired entry. Does not touch statistics.
    pub fn contains(&self, category: CacheCategory, key: &str) -> bool {
        let now = self.now_ms();
        self.index
            .get(&category.qualify(key))
            .is_some_and(|record| !record.meta.is_expired_at(now))
    }

    // == Remove ==
    /// Deletes from both tiers. Returns whether an entry was removed; only
    /// then is an eviction counted.
    pub fn remove(&mut self, category: CacheCategory, key: &str) -> bool {
        let qualified_key = category.qualify(key);
        if self.evict_key(&qualified_key) {
            true
        } else {
            self.disk.remove(category, &qualified_key);
            false
        }
    }

    /// Removes one entry from both tiers, counting an eviction.
    fn evict_key(&mut self, qualified_key: &str) -> bool {
        let Some(record) = self.index.remove(qualified_key) else {
            return false;
        };
        let category = record.meta.category();
        if record.persisted {
            self.disk.remove(category, qualified_key);
        }
        self.stats
            .record_eviction(category, record.meta.size_bytes());
        true
    }

    // == Clear ==
    /// Drops every entry of a category and zeroes its statistics bucket.
    pub fn clear_category(&mut self, category: CacheCategory) -> usize {
        let before = self.index.len();
        self.index
            .retain(|_, record| record.meta.category() != category);
        self.disk.clear_category(category);
        self.stats.reset_category(category);
        let removed = before - self.index.len();
        info!(%category, removed, "Cleared category");
        removed
    }

    /// Drops everything and zeroes all statistics.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.index.len();
        self.index.clear();
        for category in CacheCategory::ALL {
            self.disk.clear_category(category);
        }
        self.stats.reset();
        info!(removed, "Cleared all categories");
        removed
    }

    // == Cleanup Expired ==
    /// Evicts every expired entry from both tiers.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now_ms();
        let expired: Vec<String> = self
            .index
            .iter()
            .filter(|(_, record)| record.meta.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.evict_key(key);
        }
        expired.len()
    }

    // == Enforce Budget ==
    /// Runs the LRU evictor against the current budget.
    ///
    /// Returns the number of entries evicted.
    pub fn enforce_budget(&mut self) -> usize {
        let candidates: Vec<EvictionCandidate> = self
            .index
            .iter()
            .map(|(key, record)| EvictionCandidate {
                qualified_key: key.clone(),
                category: record.meta.category(),
                size_bytes: record.meta.size_bytes(),
                last_accessed_at: record.meta.last_accessed_at(),
                sequence: record.sequence,
            })
            .collect();

        let plan = plan_eviction(candidates, self.stats.total_size_bytes, &self.budget);
        for key in &plan {
            self.evict_key(key);
        }
        if !plan.is_empty() {
            debug!(
                evicted = plan.len(),
                remaining = self.index.len(),
                size_bytes = self.stats.total_size_bytes,
                "LRU eviction pass"
            );
        }
        plan.len()
    }

    // == Budget ==
    pub fn budget(&self) -> CacheBudget {
        self.budget
    }

    /// Replaces the budget and immediately re-runs eviction.
    pub fn set_budget(&mut self, budget: CacheBudget) -> usize {
        self.budget = budget;
        self.enforce_budget()
    }

    // == Flush Memory ==
    /// Releases the memory tier: memory-only entries are evicted, persisted
    /// ones keep only their index record and reload from disk on demand.
    pub fn flush_memory(&mut self) -> usize {
        let memory_only: Vec<String> = self
            .index
            .iter()
            .filter(|(_, record)| !record.persisted)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &memory_only {
            self.evict_key(key);
        }
        for record in self.index.values_mut() {
            record.payload = None;
        }
        memory_only.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    pub fn save_statistics(&self) -> Result<()> {
        self.disk.save_statistics(&self.stats)
    }

    /// Whether the entry currently has a blob in the disk tier.
    pub fn is_persisted(&self, category: CacheCategory, key: &str) -> bool {
        self.index
            .get(&category.qualify(key))
            .is_some_and(|record| record.persisted)
    }

    /// Number of live entries across both tiers.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of the recorded sizes of all live entries.
    pub fn live_size_bytes(&self) -> u64 {
        self.index.values().map(|r| r.meta.size_bytes()).sum()
    }
}
