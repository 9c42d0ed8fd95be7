use std::sync::Arc;

use log::*;
use tokio::sync::watch;

use super::{
    queue::wait_for_shutdown,
    Disposition,
    RateLimitGate,
    ReconcilerConfig,
    ReconciliationQueue,
    ReconciliationTask,
    RetryScheduler,
};
use crate::{
    db::traits::{AccrualDatabase, LedgerManagement, OrderManagement},
    db_types::{CreditOutcome, Order, OrderStatusType, Points},
    events::{AccrualCreditedEvent, EventProducers, OrderAbandonedEvent, OrderFinalizedEvent},
    oracle::{AccrualOracle, OracleOutcome, OracleStatus, OracleVerdict},
};

/// Everything a worker needs to process tasks. Cloning is cheap; every worker gets its own clone.
pub(crate) struct ReconciliationWorker<B, O> {
    pub(crate) db: B,
    pub(crate) oracle: Arc<O>,
    pub(crate) config: ReconcilerConfig,
    pub(crate) queue: ReconciliationQueue,
    pub(crate) gate: RateLimitGate,
    pub(crate) scheduler: RetryScheduler,
    pub(crate) producers: EventProducers,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<B: Clone, O> Clone for ReconciliationWorker<B, O> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            oracle: Arc::clone(&self.oracle),
            config: self.config.clone(),
            queue: self.queue.clone(),
            gate: self.gate.clone(),
            scheduler: self.scheduler.clone(),
            producers: self.producers.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<B, O> ReconciliationWorker<B, O>
where
    B: AccrualDatabase,
    O: AccrualOracle,
{
    pub(crate) async fn run(self, id: usize) {
        debug!("🔄️ Worker {id} started");
        let mut shutdown = self.shutdown.clone();
        while let Some(task) = self.queue.next(&mut shutdown).await {
            trace!("🔄️ Worker {id} picked up {task}");
            let disposition = self.process_task(&task).await;
            self.dispose(task, disposition).await;
        }
        debug!("🔄️ Worker {id} stopped");
    }

    pub(crate) async fn process_task(&self, task: &ReconciliationTask) -> Disposition {
        let order = match self.db.fetch_order_by_number(&task.order_number).await {
            Ok(Some(order)) => order,
            Ok(None) => return Disposition::Abandon(format!("Order {} does not exist", task.order_number)),
            Err(e) => return Disposition::Retry(format!("Could not load order {}. {e}", task.order_number)),
        };
        if order.status.is_terminal() {
            debug!("🔄️ Order {} is already {}. Nothing to do.", order.number, order.status);
            return Disposition::Finalized { status: order.status, credited: false };
        }
        if order.user_id != task.user_id {
            warn!(
                "🔄️ {task} names the wrong owner. Order {} belongs to user #{}. Using the stored owner.",
                order.number, order.user_id
            );
        }
        let verdict = loop {
            if !self.wait_for_gate().await {
                return Disposition::Interrupted;
            }
            match self.oracle.check_order(&order.number).await {
                OracleOutcome::Verdict(v) => break v,
                OracleOutcome::RateLimited { retry_after } => {
                    self.gate.pause_for(retry_after);
                },
                OracleOutcome::TransientFailure(e) => return Disposition::Retry(e),
                OracleOutcome::PermanentFailure(e) => return Disposition::Abandon(e),
            }
        };
        self.apply_verdict(&order, verdict).await
    }

    async fn wait_for_gate(&self) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => false,
            _ = self.gate.wait_until_open() => true,
        }
    }

    async fn apply_verdict(&self, order: &Order, verdict: OracleVerdict) -> Disposition {
        match verdict.status {
            OracleStatus::Registered | OracleStatus::Processing => {
                match self.db.update_order_status(&order.number, OrderStatusType::Processing).await {
                    Ok(_) => Disposition::StillPending,
                    Err(e) => Disposition::Retry(format!("Could not update order {}. {e}", order.number)),
                }
            },
            OracleStatus::Invalid => match self.db.update_order_status(&order.number, OrderStatusType::Invalid).await {
                Ok(updated) => {
                    if updated {
                        info!("🔄️ Order {} is INVALID", order.number);
                        let number = order.number.clone();
                        let event = OrderFinalizedEvent::new(order.user_id, number, OrderStatusType::Invalid, None);
                        self.producers.publish_order_finalized(event).await;
                    }
                    Disposition::Finalized { status: OrderStatusType::Invalid, credited: false }
                },
                Err(e) => Disposition::Retry(format!("Could not update order {}. {e}", order.number)),
            },
            OracleStatus::Processed => {
                let amount = verdict.accrual.unwrap_or(Points::ZERO);
                if amount.is_negative() {
                    return Disposition::Abandon(format!("Oracle awarded a negative accrual of {amount}"));
                }
                match self.db.credit_accrual(order.user_id, &order.number, amount).await {
                    Ok(CreditOutcome::Credited) => {
                        let (number, user_id) = (&order.number, order.user_id);
                        info!("🔄️ Order {number} is PROCESSED. User #{user_id} was credited {amount}");
                        let event = AccrualCreditedEvent::new(order.user_id, order.number.clone(), amount);
                        self.producers.publish_accrual_credited(event).await;
                        let event = OrderFinalizedEvent::new(
                            order.user_id,
                            order.number.clone(),
                            OrderStatusType::Processed,
                            Some(amount),
                        );
                        self.producers.publish_order_finalized(event).await;
                        Disposition::Finalized { status: OrderStatusType::Processed, credited: true }
                    },
                    Ok(CreditOutcome::AlreadyCredited) => {
                        Disposition::Finalized { status: OrderStatusType::Processed, credited: false }
                    },
                    Err(e) => Disposition::Retry(format!("Could not credit order {}. {e}", order.number)),
                }
            },
        }
    }

    pub(crate) async fn dispose(&self, mut task: ReconciliationTask, disposition: Disposition) {
        match disposition {
            Disposition::StillPending => {
                task.attempt = 0;
                self.scheduler.schedule(task, self.config.poll_interval);
            },
            Disposition::Retry(reason) => {
                task.attempt += 1;
                let policy = &self.config.retry;
                if policy.is_exhausted(task.attempt) {
                    warn!("🔄️ Giving up on order {} after {} attempts. {reason}", task.order_number, task.attempt);
                    self.abandon(task, reason).await;
                } else {
                    let delay = policy.jittered_delay(task.attempt);
                    debug!("🔄️ Attempt {} for order {} failed. {reason}", task.attempt, task.order_number);
                    self.scheduler.schedule(task, delay);
                }
            },
            Disposition::Abandon(reason) => {
                error!("🔄️ Order {} cannot be reconciled. {reason}", task.order_number);
                self.abandon(task, reason).await;
            },
            Disposition::Finalized { .. } | Disposition::Interrupted => self.queue.release(&task.order_number),
        }
    }

    async fn abandon(&self, task: ReconciliationTask, reason: String) {
        self.queue.abandon(&task.order_number);
        let event = OrderAbandonedEvent::new(task.user_id, task.order_number, task.attempt, reason);
        self.producers.publish_order_abandoned(event).await;
    }
}
