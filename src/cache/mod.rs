//! Cache Module
//!
//! Two-tier (memory + disk) cache with TTL expiration, LRU eviction,
//! per-category quotas and byte-accurate size accounting.

mod budget;
mod category;
mod clock;
mod disk;
mod entry;
mod lru;
mod manager;
mod stats;
mod store;


// Re-export public types
pub use budget::{CacheBudget, DeviceTier, FixedMemoryProbe, MemoryProbe, SystemMemoryProbe};
pub use category::CacheCategory;
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use disk::{DiskTier, STATISTICS_FILE};
pub use entry::{duration_ms, CacheEntry, EntryMeta};
pub use lru::{plan_eviction, EvictionCandidate};
pub use manager::{CacheManager, SweepReport};
pub use stats::{CacheStats, CategoryStats};
pub use store::{CacheStore, Lookup};

// == Public Constants ==
/// Entries whose serialized payload exceeds this many bytes are also
/// persisted to the disk tier.
pub const DISK_THRESHOLD_BYTES: usize = 1024;
