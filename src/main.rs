//! Unified Cache - host process
//!
//! Opens the process-wide cache, runs the janitor and forwards low-memory
//! signals until shutdown.

use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unified_cache::{
    pressure_channel, spawn_janitor_task, spawn_pressure_monitor, CacheManager, Config,
    MemoryPressure,
};

/// Main entry point for the cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache (directories, statistics, disk index, budget)
/// 4. Start the janitor and the memory pressure monitor
/// 5. Forward SIGUSR1 as a low-memory signal
/// 6. On SIGINT/SIGTERM, stop the tasks and flush statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unified_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting unified cache");

    let config = Config::from_env();
    info!(
        cache_dir = %config.cache_dir.display(),
        disk_threshold_bytes = config.disk_threshold_bytes,
        janitor_interval = config.janitor_interval,
        pressure_cooldown = config.pressure_cooldown,
        "Configuration loaded"
    );

    let manager = CacheManager::open(&config).await?;
    let stats = manager.statistics().await;
    info!(
        entries = manager.entry_count().await,
        size_bytes = stats.total_size_bytes,
        hit_rate = stats.hit_rate(),
        "Cache opened"
    );

    let janitor = spawn_janitor_task(
        manager.clone(),
        Duration::from_secs(config.janitor_interval.max(1)),
    );
    let (pressure_tx, pressure_rx) = pressure_channel();
    let monitor = spawn_pressure_monitor(manager.clone(), pressure_rx);
    let forwarder = tokio::spawn(forward_low_memory_signals(pressure_tx));

    shutdown_signal().await;

    // Teardown: stop the timer and detach the pressure subscription; writes
    // already on a worker finish before the flush acquires the lock
    janitor.abort();
    forwarder.abort();
    monitor.abort();
    warn!("Background tasks stopped");

    manager.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Forwards SIGUSR1 to the pressure monitor. No-op on non-Unix hosts.
async fn forward_low_memory_signals(tx: mpsc::Sender<MemoryPressure>) {
    #[cfg(unix)]
    {
        let mut usr1 = match signal::unix::signal(signal::unix::SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGUSR1 handler, pressure signals disabled");
                return;
            }
        };
        while usr1.recv().await.is_some() {
            info!("Received SIGUSR1, treating as memory pressure");
            if tx.send(MemoryPressure).await.is_err() {
                break;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _tx = tx;
        std::future::pending::<()>().await;
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
