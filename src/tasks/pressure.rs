//! Memory Pressure Monitor
//!
//! Consumes low-memory signals and hands them to the cache right away,
//! outside the janitor's cadence.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::CacheManager;

/// A low-memory notification from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPressure;

/// Creates the channel the host feeds pressure signals into.
pub fn pressure_channel() -> (mpsc::Sender<MemoryPressure>, mpsc::Receiver<MemoryPressure>) {
    mpsc::channel(8)
}

/// Spawns the monitor. It exits when every sender is dropped; aborting the
/// handle detaches it early.
pub fn spawn_pressure_monitor(
    manager: CacheManager,
    mut signals: mpsc::Receiver<MemoryPressure>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Memory pressure monitor attached");
        while signals.recv().await.is_some() {
            manager.handle_memory_pressure().await;
        }
        info!("Memory pressure monitor detached");
    })
}
