//! Background Tasks Module
//!
//! Contains the tasks that consume the cache outside of caller requests.
//!
//! # Tasks
//! - Janitor: periodic sweep of expired entries and budget enforcement
//! - Pressure monitor: immediate release on low-memory signals

mod janitor;
mod pressure;

pub use janitor::spawn_janitor_task;
pub use pressure::{pressure_channel, spawn_pressure_monitor, MemoryPressure};
