use std::time::Duration;

use accrual_engine::{ReconcilerHandle, SqliteDatabase};
use log::*;
use tokio::{sync::watch, task::JoinHandle};

/// Starts the recovery sweep. Every `interval`, orders that are still `NEW` or `PROCESSING` but are not pending in the
/// engine are re-admitted. The worker stops when `shutdown` is signalled.
pub fn start_sweep_worker(
    engine: ReconcilerHandle<SqliteDatabase>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately, and start-up recovery has already run
        timer.tick().await;
        info!("🧹️ Recovery sweep started. Running every {}s", interval.as_secs());
        loop {
            tokio::select! {
                _ = timer.tick() => {},
                _ = shutdown.changed() => break,
            }
            trace!("🧹️ Running recovery sweep");
            match engine.recover_pending().await {
                Ok(0) => trace!("🧹️ No orders needed recovering"),
                Ok(n) => info!("🧹️ {n} orders re-admitted"),
                Err(e) => error!("🧹️ Error running recovery sweep: {e}"),
            }
        }
        info!("🧹️ Recovery sweep stopped");
    })
}
