//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{CacheBudget, DISK_THRESHOLD_BYTES};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the disk tier and the statistics blob
    pub cache_dir: PathBuf,
    /// Entries whose serialized size exceeds this are also written to disk
    pub disk_threshold_bytes: usize,
    /// Janitor sweep interval in seconds
    pub janitor_interval: u64,
    /// Seconds the pressure flag stays raised after the last signal
    pub pressure_cooldown: u64,
    /// Byte budget override; the device probe decides when unset
    pub max_memory_bytes: Option<u64>,
    /// Entry budget override; the device probe decides when unset
    pub max_entries: Option<usize>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Disk tier root (default: `<platform cache dir>/unified-cache`)
    /// - `DISK_THRESHOLD_BYTES` - Disk persistence threshold (default: 1024)
    /// - `JANITOR_INTERVAL` - Sweep frequency in seconds (default: 21600)
    /// - `PRESSURE_COOLDOWN` - Pressure flag cooldown in seconds (default: 30)
    /// - `MAX_MEMORY_BYTES` - Byte budget override (default: device probe)
    /// - `MAX_ENTRIES` - Entry budget override (default: device probe)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            disk_threshold_bytes: parse_var("DISK_THRESHOLD_BYTES")
                .unwrap_or(defaults.disk_threshold_bytes),
            janitor_interval: parse_var("JANITOR_INTERVAL").unwrap_or(defaults.janitor_interval),
            pressure_cooldown: parse_var("PRESSURE_COOLDOWN")
                .unwrap_or(defaults.pressure_cooldown),
            max_memory_bytes: parse_var("MAX_MEMORY_BYTES"),
            max_entries: parse_var("MAX_ENTRIES"),
        }
    }

    /// Config rooted at `cache_dir` with every other value at its default.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Budget pinned by the overrides, filling unset halves from `fallback`.
    pub fn budget_override(&self, fallback: CacheBudget) -> Option<CacheBudget> {
        if self.max_memory_bytes.is_none() && self.max_entries.is_none() {
            return None;
        }
        Some(CacheBudget {
            max_memory_bytes: self.max_memory_bytes.unwrap_or(fallback.max_memory_bytes),
            max_entries: self.max_entries.unwrap_or(fallback.max_entries),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(env::temp_dir)
                .join("unified-cache"),
            disk_threshold_bytes: DISK_THRESHOLD_BYTES,
            janitor_interval: 6 * 60 * 60,
            pressure_cooldown: 30,
            max_memory_bytes: None,
            max_entries: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.disk_threshold_bytes, 1024);
        assert_eq!(config.janitor_interval, 21600);
        assert_eq!(config.pressure_cooldown, 30);
        assert!(config.max_memory_bytes.is_none());
        assert!(config.max_entries.is_none());
        assert!(config.cache_dir.ends_with("unified-cache"));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("DISK_THRESHOLD_BYTES");
        env::remove_var("JANITOR_INTERVAL");
        env::remove_var("PRESSURE_COOLDOWN");
        env::remove_var("MAX_MEMORY_BYTES");
        env::remove_var("MAX_ENTRIES");

        let config = Config::from_env();
        assert_eq!(config.disk_threshold_bytes, 1024);
        assert_eq!(config.janitor_interval, 21600);
        assert_eq!(config.pressure_cooldown, 30);
        assert!(config.budget_override(CacheBudget::new(1, 1)).is_none());
    }

    #[test]
    fn test_budget_override_fills_missing_half() {
        let config = Config {
            max_entries: Some(2),
            ..Config::with_cache_dir("/tmp/unused")
        };
        let budget = config
            .budget_override(CacheBudget::new(4096, 100))
            .unwrap();
        assert_eq!(budget.max_entries, 2);
        assert_eq!(budget.max_memory_bytes, 4096);
    }
}
