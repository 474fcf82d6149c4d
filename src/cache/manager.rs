//! Cache Manager Module
//!
//! The shared, async facade collaborators hold. One `RwLock` guards the
//! combined tier state: `contains` and the resident fast path of `retrieve`
//! share the read lock, everything else takes the write lock. Serialization
//! and disk I/O run on blocking workers; a write that reaches its worker
//! always completes, even if the caller goes away.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{
    duration_ms, CacheBudget, CacheCategory, CacheEntry, CacheStats, CacheStore, Clock,
    DeviceTier, DiskTier, Lookup, MemoryProbe, SystemClock, SystemMemoryProbe,
};
use crate::config::Config;
use crate::error::Result;

// == Sweep Report ==
/// Outcome of one janitor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries removed because their TTL had elapsed
    pub expired: usize,
    /// Entries removed by the LRU evictor
    pub evicted: usize,
    /// Live entries after the sweep
    pub entries: usize,
    /// Tracked bytes after the sweep
    pub size_bytes: u64,
}

#[derive(Debug)]
struct Shared {
    state: Arc<RwLock<CacheStore>>,
    clock: Arc<dyn Clock>,
    sweep_running: AtomicBool,
    /// Pressure flag deadline (Unix milliseconds); raised while now is before
    /// it. Set by the first signal of a window, never extended by later ones.
    pressure_until: AtomicU64,
    pressure_cooldown: Duration,
}

/// Clears the sweep flag when the sweep ends, however it ends.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// == Cache Manager ==
/// Process-wide cache handle. Cloning is cheap and every clone shares the
/// same tiers.
#[derive(Debug, Clone)]
pub struct CacheManager {
    shared: Arc<Shared>,
}

impl CacheManager {
    // == Constructor ==
    /// Opens the cache with the system clock, sizing the budget from the
    /// device's available memory unless the config pins it.
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_with(config, Arc::new(SystemClock), &SystemMemoryProbe).await
    }

    /// Opens the cache with an explicit clock and memory probe.
    ///
    /// Creates the directory tree, loads the statistics blob and indexes the
    /// disk tier.
    pub async fn open_with(
        config: &Config,
        clock: Arc<dyn Clock>,
        probe: &dyn MemoryProbe,
    ) -> Result<Self> {
        let tier = probe.device_tier();
        let budget = config
            .budget_override(tier.budget())
            .unwrap_or_else(|| tier.budget());
        info!(
            %tier,
            max_memory_bytes = budget.max_memory_bytes,
            max_entries = budget.max_entries,
            "Selected cache budget"
        );

        let root = config.cache_dir.clone();
        let threshold = config.disk_threshold_bytes;
        let store_clock = clock.clone();
        let store = tokio::task::spawn_blocking(move || -> Result<CacheStore> {
            let disk = DiskTier::open(root)?;
            Ok(CacheStore::open(disk, budget, threshold, store_clock))
        })
        .await??;

        Ok(Self {
            shared: Arc::new(Shared {
                state: Arc::new(RwLock::new(store)),
                clock,
                sweep_running: AtomicBool::new(false),
                pressure_until: AtomicU64::new(0),
                pressure_cooldown: Duration::from_secs(config.pressure_cooldown),
            }),
        })
    }

    /// Runs `f` on a blocking worker while holding the write lock.
    async fn write<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut CacheStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.shared.state.clone().write_owned().await;
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            f(&mut guard)
        })
        .await;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, "Cache worker failed");
                None
            }
        }
    }

    // == Store ==
    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// Best effort: a payload that fails to serialize is logged and dropped.
    /// `ttl` overrides the category default.
    pub async fn store<T>(
        &self,
        payload: T,
        key: impl Into<String>,
        category: CacheCategory,
        ttl: Option<Duration>,
    ) where
        T: Serialize + Send + 'static,
    {
        let key = key.into();
        let encoded = tokio::task::spawn_blocking(move || serde_json::to_vec(&payload)).await;
        let bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(%category, key = %key, error = %e, "Failed to serialize payload, not cached");
                return;
            }
            Err(e) => {
                error!(%category, key = %key, error = %e, "Serialization worker failed");
                return;
            }
        };

        let ttl = ttl.unwrap_or_else(|| category.default_ttl());
        self.write(move |store| {
            let entry = CacheEntry::new(key, category, bytes, ttl, store.now_ms());
            store.insert(entry);
        })
        .await;
    }

    // == Retrieve ==
    /// Returns the cached value, or `None` when absent, expired or not
    /// decodable as `T`. Records exactly one hit or miss.
    pub async fn retrieve<T>(&self, category: CacheCategory, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let lookup = self.shared.state.read().await.lookup(category, key);
        let entry = match lookup {
            Lookup::Resident(entry) => entry,
            Lookup::Unresolved => {
                let key = key.to_string();
                self.write(move |store| store.resolve(category, &key))
                    .await
                    .flatten()?
            }
        };

        let payload = entry.payload().clone();
        let decoded =
            tokio::task::spawn_blocking(move || serde_json::from_slice::<T>(&payload)).await;

        match decoded {
            Ok(Ok(value)) => {
                self.shared.state.write().await.record_hit(&entry);
                Some(value)
            }
            Ok(Err(e)) => {
                debug!(%category, key, error = %e, "Cached payload does not decode as requested type");
                self.write(move |store| store.discard_undecodable(&entry))
                    .await;
                None
            }
            Err(e) => {
                error!(%category, key, error = %e, "Deserialization worker failed");
                self.write(move |store| store.discard_undecodable(&entry))
                    .await;
                None
            }
        }
    }

    // == Contains ==
    /// True only if present and unexpired. Statistics are untouched.
    pub async fn contains(&self, category: CacheCategory, key: &str) -> bool {
        self.shared.state.read().await.contains(category, key)
    }

    // == Remove ==
    /// Deletes the entry from both tiers. Returns whether one existed.
    pub async fn remove(&self, category: CacheCategory, key: &str) -> bool {
        let key = key.to_string();
        self.write(move |store| store.remove(category, &key))
            .await
            .unwrap_or(false)
    }

    // == Clear ==
    /// Drops a category and zeroes its statistics bucket.
    pub async fn clear(&self, category: CacheCategory) -> usize {
        self.write(move |store| store.clear_category(category))
            .await
            .unwrap_or(0)
    }

    /// Drops every entry and zeroes all statistics.
    pub async fn clear_all(&self) -> usize {
        self.write(|store| store.clear_all()).await.unwrap_or(0)
    }

    // == Preload ==
    /// Stores `items[i]` under `keys[i]`.
    ///
    /// Mismatched lengths store nothing.
    pub async fn preload<T>(&self, items: Vec<T>, keys: Vec<String>, category: CacheCategory)
    where
        T: Serialize + Send + 'static,
    {
        if items.len() != keys.len() {
            warn!(
                %category,
                items = items.len(),
                keys = keys.len(),
                "Preload ignored: items and keys differ in length"
            );
            return;
        }
        for (item, key) in items.into_iter().zip(keys) {
            self.store(item, key, category, None).await;
        }
    }

    // == Sweep ==
    /// Evicts expired entries, enforces the budget and persists statistics.
    ///
    /// Returns `None` without doing anything if a sweep is already running.
    pub async fn sweep(&self) -> Option<SweepReport> {
        if self
            .shared
            .sweep_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already running, skipping");
            return None;
        }
        let _guard = SweepGuard(&self.shared.sweep_running);

        self.write(|store| {
            let expired = store.cleanup_expired();
            let evicted = store.enforce_budget();
            if let Err(e) = store.save_statistics() {
                warn!(error = %e, "Failed to persist statistics");
            }
            SweepReport {
                expired,
                evicted,
                entries: store.len(),
                size_bytes: store.stats().total_size_bytes,
            }
        })
        .await
    }

    // == Memory Pressure ==
    /// Responds to a low-memory signal: raises the pressure flag, drops the
    /// lowest-priority categories, then runs the evictor.
    ///
    /// The flag lowers a fixed cooldown after it was raised. Signals arriving
    /// while it is up still release entries but do not push the deadline.
    ///
    /// Returns the number of entries released.
    pub async fn handle_memory_pressure(&self) -> usize {
        let now = self.shared.clock.now_ms();
        let until = now.saturating_add(duration_ms(self.shared.pressure_cooldown));
        let raised = self
            .shared
            .pressure_until
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current <= now).then_some(until)
            })
            .is_ok();
        if raised {
            info!(until, "Memory pressure flag raised");
        }

        let released = self
            .write(|store| {
                let mut released = 0;
                for category in CacheCategory::PRESSURE_ORDER {
                    released += store.clear_category(category);
                }
                released + store.enforce_budget()
            })
            .await
            .unwrap_or(0);

        warn!(released, "Memory pressure: released cache entries");
        released
    }

    /// Whether a pressure signal arrived within the cooldown window.
    pub fn is_under_pressure(&self) -> bool {
        self.shared.clock.now_ms() < self.shared.pressure_until.load(Ordering::Acquire)
    }

    // == Budget ==
    pub async fn budget(&self) -> CacheBudget {
        self.shared.state.read().await.budget()
    }

    /// Replaces the budget; eviction runs immediately. Returns the number of
    /// entries evicted.
    pub async fn set_budget(&self, budget: CacheBudget) -> usize {
        info!(
            max_memory_bytes = budget.max_memory_bytes,
            max_entries = budget.max_entries,
            "Cache budget changed"
        );
        self.write(move |store| store.set_budget(budget))
            .await
            .unwrap_or(0)
    }

    /// Re-probes the device and switches to the matching budget tier.
    pub async fn apply_device_profile(&self, probe: &dyn MemoryProbe) -> DeviceTier {
        let tier = probe.device_tier();
        self.set_budget(tier.budget()).await;
        tier
    }

    // == Memory Tier ==
    /// Releases the memory tier; only persisted entries stay reachable.
    pub async fn flush_memory_tier(&self) -> usize {
        self.write(|store| store.flush_memory()).await.unwrap_or(0)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn statistics(&self) -> CacheStats {
        self.shared.state.read().await.stats()
    }

    /// Live entries across both tiers.
    pub async fn entry_count(&self) -> usize {
        self.shared.state.read().await.len()
    }

    /// Tracked bytes across both tiers.
    pub async fn size_bytes(&self) -> u64 {
        self.shared.state.read().await.stats().total_size_bytes
    }

    /// Whether the entry currently has a disk blob.
    pub async fn is_persisted(&self, category: CacheCategory, key: &str) -> bool {
        self.shared.state.read().await.is_persisted(category, key)
    }

    // == Shutdown ==
    /// Best-effort statistics flush. Waits for any in-flight write first.
    pub async fn shutdown(&self) {
        let saved = self.write(|store| store.save_statistics()).await;
        match saved {
            Some(Ok(())) => info!("Cache statistics flushed"),
            Some(Err(e)) => warn!(error = %e, "Failed to flush cache statistics"),
            None => {}
        }
    }
}
