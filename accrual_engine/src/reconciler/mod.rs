//! # Reconciliation engine
//!
//! The engine turns the accrual oracle's verdicts into order statuses and bonus ledger entries.
//!
//! Orders enter the engine as [`ReconciliationTask`]s on a shared [`ReconciliationQueue`], either from the ingestion
//! API or from [`ReconcilerHandle::recover_pending`], which re-admits every order that has not reached a terminal
//! status. A pool of workers takes tasks off the queue, asks the oracle about each one, and classifies the result as
//! a [`Disposition`]:
//!
//! * Orders the oracle is still working on are checked again after the poll interval.
//! * Transient failures (network, 5xx, storage) are retried with exponential backoff, up to a maximum number of
//!   attempts, after which the order is abandoned.
//! * A 429 closes the [`RateLimitGate`] for everyone. No worker calls the oracle until it opens again, and the task
//!   that was rate limited is the first one retried.
//! * `INVALID` and `PROCESSED` verdicts are final. Crediting a processed order goes through
//!   [`LedgerManagement::credit_accrual`](crate::LedgerManagement::credit_accrual), which never credits an order twice.
//!
//! Abandoned orders keep their last known status. They are reported through the `on_order_abandoned` hook and are
//! not recovered again until the engine restarts.
use std::{sync::Arc, time::Duration};

use log::*;
use tokio::{sync::watch, task::JoinHandle};

mod queue;
mod rate_limit;
mod retry;
mod task;
mod worker;

pub use queue::{Admission, ReconciliationQueue};
pub use rate_limit::RateLimitGate;
pub use retry::{RetryPolicy, RetryScheduler};
pub use task::ReconciliationTask;
use worker::ReconciliationWorker;

use crate::{
    db::traits::{AccrualDatabase, OrderManagement},
    db_types::{OrderNumber, OrderStatusType},
    events::EventProducers,
    oracle::AccrualOracle,
};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// The number of concurrent workers
    pub workers: usize,
    /// The minimum delay between two checks of the same order while the oracle is still processing it
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_WORKERS, poll_interval: DEFAULT_POLL_INTERVAL, retry: RetryPolicy::default() }
    }
}

impl ReconcilerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// What happens to a task after it has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The oracle has not decided yet. Check again after the poll interval.
    StillPending,
    /// The order is terminal. `credited` is true if this run moved points into the owner's balance.
    Finalized { status: OrderStatusType, credited: bool },
    /// Something transient went wrong. Try again after a backoff.
    Retry(String),
    /// Retrying will not help. The order keeps its current status.
    Abandon(String),
    /// The engine shut down before the task could be processed.
    Interrupted,
}

/// A cheap, cloneable handle for admitting work to a running [`Reconciler`].
#[derive(Clone)]
pub struct ReconcilerHandle<B> {
    db: B,
    queue: ReconciliationQueue,
}

impl<B> ReconcilerHandle<B>
where B: AccrualDatabase
{
    /// Admits a task for the order. Never blocks. Returns `false` only if the engine is shutting down.
    pub fn enqueue(&self, order_number: OrderNumber, user_id: i64) -> bool {
        self.queue.enqueue(ReconciliationTask::new(order_number, user_id)).is_accepted()
    }

    /// Scans the store for orders that are still `NEW` or `PROCESSING` and admits a task for each. Orders that are
    /// already pending in this engine, or that this engine has abandoned, are skipped. Returns the number of orders
    /// newly admitted.
    pub async fn recover_pending(&self) -> Result<usize, <B as OrderManagement>::Error> {
        let orders = self.db.fetch_pending_orders().await?;
        let admitted = orders
            .iter()
            .filter(|o| !self.queue.is_abandoned(&o.number))
            .filter(|o| self.queue.enqueue(ReconciliationTask::for_order(o)) == Admission::Queued)
            .count();
        if admitted > 0 {
            info!("🔄️ Recovered {admitted} of {} unreconciled orders", orders.len());
        } else {
            trace!("🔄️ {} unreconciled orders, all of them already pending", orders.len());
        }
        Ok(admitted)
    }

    pub fn queue(&self) -> &ReconciliationQueue {
        &self.queue
    }
}

pub struct Reconciler<B, O> {
    worker: ReconciliationWorker<B, O>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl<B, O> Reconciler<B, O>
where
    B: AccrualDatabase,
    O: AccrualOracle,
{
    pub fn new(db: B, oracle: O, config: ReconcilerConfig, producers: EventProducers) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let queue = ReconciliationQueue::new();
        let scheduler = RetryScheduler::new(queue.clone(), shutdown_rx.clone());
        let worker = ReconciliationWorker {
            db,
            oracle: Arc::new(oracle),
            config,
            queue,
            gate: RateLimitGate::new(),
            scheduler,
            producers,
            shutdown: shutdown_rx,
        };
        Self { worker, shutdown, handles: Vec::new() }
    }

    /// Spawns the worker pool. Calling this on a running engine does nothing.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!("🔄️ Reconciliation engine is already running");
            return;
        }
        let workers = self.worker.config.workers.max(1);
        self.handles = (0..workers).map(|id| tokio::spawn(self.worker.clone().run(id))).collect();
        info!("🔄️ Reconciliation engine started with {workers} workers");
    }

    pub fn handle(&self) -> ReconcilerHandle<B> {
        ReconcilerHandle { db: self.worker.db.clone(), queue: self.worker.queue.clone() }
    }

    pub fn enqueue(&self, order_number: OrderNumber, user_id: i64) -> bool {
        self.handle().enqueue(order_number, user_id)
    }

    pub async fn recover_pending(&self) -> Result<usize, <B as OrderManagement>::Error> {
        self.handle().recover_pending().await
    }

    /// Processes a single task without touching the queue, and returns what should happen to it next.
    pub async fn process_task(&self, task: &ReconciliationTask) -> Disposition {
        self.worker.process_task(task).await
    }

    pub fn rate_limit_gate(&self) -> &RateLimitGate {
        &self.worker.gate
    }

    pub fn queue(&self) -> &ReconciliationQueue {
        &self.worker.queue
    }

    /// Stops accepting work, drops scheduled retries and waits for the workers to finish the tasks they are on.
    pub async fn shutdown(mut self) {
        info!("🔄️ Reconciliation engine is shutting down");
        self.worker.queue.close();
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("🔄️ A reconciliation worker did not shut down cleanly. {e}");
            }
        }
        info!("🔄️ Reconciliation engine has stopped");
    }
}
