use accrual_engine::{
    events::{EventHandlers, EventHooks},
    HttpOracleClient,
    Reconciler,
    SqliteDatabase,
};
use log::*;
use tokio::sync::watch;

use crate::{config::ServerConfig, errors::ServerError, sweep_worker::start_sweep_worker};

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await?;
    let oracle = HttpOracleClient::new(config.oracle_client_config())?;
    info!("🚀️ Using the accrual system at {}", config.oracle.address);

    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();

    let mut reconciler = Reconciler::new(db.clone(), oracle, config.reconciler_config(), producers);
    reconciler.start();
    let recovered = reconciler.recover_pending().await?;
    info!("🚀️ {recovered} unfinished orders recovered at start-up");

    let (stop_sweep, sweep_shutdown) = watch::channel(false);
    let sweep = config
        .sweep_enabled
        .then(|| start_sweep_worker(reconciler.handle(), config.sweep_interval, sweep_shutdown));

    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutdown requested");
    let _ = stop_sweep.send(true);
    if let Some(sweep) = sweep {
        if let Err(e) = sweep.await {
            warn!("🚀️ Recovery sweep did not stop cleanly. {e}");
        }
    }
    reconciler.shutdown().await;
    db.close().await;
    Ok(())
}

/// Hooks that write reconciliation events to the log.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_accrual_credited(|ev| {
            Box::pin(async move {
                info!("📬️ User #{} credited {} for order {}", ev.user_id, ev.amount, ev.order_number);
            })
        })
        .on_order_abandoned(|ev| {
            Box::pin(async move {
                warn!(
                    "📬️ Order {} for user #{} was abandoned after {} failed attempts. {}",
                    ev.order_number, ev.user_id, ev.attempts, ev.reason
                );
            })
        });
    hooks
}
