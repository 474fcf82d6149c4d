//! Janitor Task
//!
//! Background task that periodically sweeps the cache: expired entries are
//! evicted, the budget is enforced and statistics are persisted.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns the periodic janitor.
///
/// The first sweep happens one full interval after spawning. Ticks missed
/// while a sweep is slow are skipped rather than replayed, and a sweep that
/// would overlap another one (for example a manual `sweep()`) is dropped.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted on teardown.
///
/// # Example
/// ```ignore
/// let janitor = spawn_janitor_task(manager.clone(), Duration::from_secs(6 * 3600));
/// // Later, during shutdown:
/// janitor.abort();
/// ```
pub fn spawn_janitor_task(manager: CacheManager, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = every.as_secs(), "Starting cache janitor");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match manager.sweep().await {
                Some(report) if report.expired + report.evicted > 0 => info!(
                    expired = report.expired,
                    evicted = report.evicted,
                    entries = report.entries,
                    size_bytes = report.size_bytes,
                    "Janitor sweep"
                ),
                Some(_) => debug!("Janitor sweep: nothing to remove"),
                None => debug!("Janitor sweep skipped, another sweep in progress"),
            }
        }
    })
}
