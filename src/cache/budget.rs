//! Budget Module
//!
//! Byte and entry budgets, and the device probe that picks one.

use std::fmt;

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

// == Cache Budget ==
/// Global limits the evictor enforces across both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheBudget {
    pub max_memory_bytes: u64,
    pub max_entries: usize,
}

impl CacheBudget {
    pub fn new(max_memory_bytes: u64, max_entries: usize) -> Self {
        Self {
            max_memory_bytes,
            max_entries,
        }
    }
}

impl Default for CacheBudget {
    fn default() -> Self {
        DeviceTier::Medium.budget()
    }
}

// == Device Tier ==
/// Capability class derived from available physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceTier {
    Low,
    Medium,
    High,
}

impl DeviceTier {
    /// Classifies a device by its available memory in bytes.
    pub fn from_available_memory(available_bytes: u64) -> Self {
        if available_bytes < 2 * GIB {
            DeviceTier::Low
        } else if available_bytes < 4 * GIB {
            DeviceTier::Medium
        } else {
            DeviceTier::High
        }
    }

    pub fn budget(&self) -> CacheBudget {
        match self {
            DeviceTier::Low => CacheBudget::new(10 * MIB, 250),
            DeviceTier::Medium => CacheBudget::new(25 * MIB, 500),
            DeviceTier::High => CacheBudget::new(50 * MIB, 1000),
        }
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceTier::Low => "low",
            DeviceTier::Medium => "medium",
            DeviceTier::High => "high",
        };
        f.write_str(name)
    }
}

// == Memory Probe ==
/// Reports how much physical memory is currently available.
pub trait MemoryProbe: Send + Sync {
    fn available_memory(&self) -> u64;

    fn device_tier(&self) -> DeviceTier {
        DeviceTier::from_available_memory(self.available_memory())
    }
}

/// Probe backed by the operating system via `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_memory(&self) -> u64 {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

/// Probe that always reports the same figure.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub u64);

impl MemoryProbe for FixedMemoryProbe {
    fn available_memory(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(DeviceTier::from_available_memory(512 * MIB), DeviceTier::Low);
        assert_eq!(DeviceTier::from_available_memory(2 * GIB - 1), DeviceTier::Low);
        assert_eq!(DeviceTier::from_available_memory(2 * GIB), DeviceTier::Medium);
        assert_eq!(DeviceTier::from_available_memory(4 * GIB), DeviceTier::High);
    }

    #[test]
    fn test_budgets_grow_with_tier() {
        let low = DeviceTier::Low.budget();
        let medium = DeviceTier::Medium.budget();
        let high = DeviceTier::High.budget();
        assert!(low.max_memory_bytes < medium.max_memory_bytes);
        assert!(medium.max_memory_bytes < high.max_memory_bytes);
        assert!(low.max_entries < medium.max_entries);
        assert!(medium.max_entries < high.max_entries);
    }

    #[test]
    fn test_fixed_probe() {
        let probe = FixedMemoryProbe(8 * GIB);
        assert_eq!(probe.device_tier(), DeviceTier::High);
        assert_eq!(probe.device_tier().to_string(), "high");
    }
}
