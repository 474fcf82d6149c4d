//! Unified Cache - one process-wide cache for many subsystems
//!
//! Two tiers (memory + disk) with TTL expiration, LRU eviction, per-category
//! quotas and memory-pressure response.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheBudget, CacheCategory, CacheManager, CacheStats};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{pressure_channel, spawn_janitor_task, spawn_pressure_monitor, MemoryPressure};
