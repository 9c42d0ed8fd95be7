use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
};

use log::*;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use super::ReconciliationTask;
use crate::db_types::OrderNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The task was added to the queue.
    Queued,
    /// A task for the same order is already queued, in flight, or waiting for a retry.
    AlreadyPending,
    /// The queue has been closed and accepts no further work.
    Closed,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Admission::Closed)
    }
}

/// An unbounded, multi-consumer queue of reconciliation tasks.
///
/// An order is *pending* from the moment it is admitted until its task is retired with [`release`](Self::release).
/// While it is pending, further admissions for the same order are no-ops, which keeps the recovery sweep from piling
/// up duplicates of orders that are already being handled.
///
/// Orders retired with [`abandon`](Self::abandon) are remembered for the lifetime of the queue, so the recovery sweep
/// leaves them alone. An explicit [`enqueue`](Self::enqueue) gives them another chance.
#[derive(Clone)]
pub struct ReconciliationQueue {
    sender: mpsc::UnboundedSender<ReconciliationTask>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<ReconciliationTask>>>,
    pending: Arc<Mutex<HashSet<OrderNumber>>>,
    abandoned: Arc<Mutex<HashSet<OrderNumber>>>,
    closed: Arc<AtomicBool>,
}

impl Default for ReconciliationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            pending: Arc::new(Mutex::new(HashSet::new())),
            abandoned: Arc::new(Mutex::new(HashSet::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Admits a task. Never blocks.
    pub fn enqueue(&self, task: ReconciliationTask) -> Admission {
        if self.is_closed() {
            debug!("🔄️ Queue is closed. {task} was refused");
            return Admission::Closed;
        }
        if !self.lock_pending().insert(task.order_number.clone()) {
            trace!("🔄️ Order {} is already pending", task.order_number);
            return Admission::AlreadyPending;
        }
        lock(&self.abandoned).remove(&task.order_number);
        if self.push(task) {
            Admission::Queued
        } else {
            Admission::Closed
        }
    }

    /// Puts a task that is already pending back on the queue.
    pub(crate) fn requeue(&self, task: ReconciliationTask) -> bool {
        if self.is_closed() {
            trace!("🔄️ Queue is closed. {task} was dropped");
            return false;
        }
        self.push(task)
    }

    fn push(&self, task: ReconciliationTask) -> bool {
        let number = task.order_number.clone();
        match self.sender.send(task) {
            Ok(()) => true,
            Err(e) => {
                warn!("🔄️ Could not queue {}. {e}", e.0);
                self.release(&number);
                false
            },
        }
    }

    /// Waits for the next task. Returns `None` as soon as `shutdown` is signalled.
    pub async fn next(&self, shutdown: &mut watch::Receiver<bool>) -> Option<ReconciliationTask> {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => None,
            task = async { self.receiver.lock().await.recv().await } => task,
        }
    }

    /// Retires the order, so that it may be admitted again.
    pub fn release(&self, number: &OrderNumber) {
        self.lock_pending().remove(number);
    }

    /// Retires the order without a verdict. It will not be recovered again by this queue.
    pub fn abandon(&self, number: &OrderNumber) {
        lock(&self.abandoned).insert(number.clone());
        self.release(number);
    }

    pub fn is_abandoned(&self, number: &OrderNumber) -> bool {
        lock(&self.abandoned).contains(number)
    }

    pub fn is_pending(&self, number: &OrderNumber) -> bool {
        self.lock_pending().contains(number)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<OrderNumber>> {
        lock(&self.pending)
    }
}

// The sets are always left consistent, so a poisoned lock is still usable
fn lock(set: &Mutex<HashSet<OrderNumber>>) -> MutexGuard<'_, HashSet<OrderNumber>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn task(number: &str) -> ReconciliationTask {
        ReconciliationTask::new(number.into(), 1)
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_pending() {
        let queue = ReconciliationQueue::new();
        let (_tx, mut rx) = watch::channel(false);
        assert_eq!(queue.enqueue(task("61508349208")), Admission::Queued);
        assert_eq!(queue.enqueue(task("61508349208")), Admission::AlreadyPending);
        assert_eq!(queue.enqueue(task("24619735244")), Admission::Queued);
        assert_eq!(queue.pending_count(), 2);

        let first = queue.next(&mut rx).await.unwrap();
        assert_eq!(first.order_number.as_str(), "61508349208");
        // Still pending while in flight
        assert_eq!(queue.enqueue(task("61508349208")), Admission::AlreadyPending);
        queue.release(&first.order_number);
        assert!(!queue.is_pending(&first.order_number));
        assert_eq!(queue.enqueue(task("61508349208")), Admission::Queued);

        let second = queue.next(&mut rx).await.unwrap();
        assert_eq!(second.order_number.as_str(), "24619735244");
    }

    #[tokio::test]
    async fn abandoned_orders_are_remembered() {
        let queue = ReconciliationQueue::new();
        let (_tx, mut rx) = watch::channel(false);
        queue.enqueue(task("62794305672"));
        let t = queue.next(&mut rx).await.unwrap();
        queue.abandon(&t.order_number);
        assert!(!queue.is_pending(&t.order_number));
        assert!(queue.is_abandoned(&t.order_number));
        // An explicit enqueue clears the mark
        assert_eq!(queue.enqueue(task("62794305672")), Admission::Queued);
        assert!(!queue.is_abandoned(&t.order_number));
    }

    #[tokio::test]
    async fn closed_queue_refuses_work() {
        let queue = ReconciliationQueue::new();
        queue.close();
        let admission = queue.enqueue(task("61508349208"));
        assert_eq!(admission, Admission::Closed);
        assert!(!admission.is_accepted());
        assert!(!queue.requeue(task("61508349208")));
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn next_returns_none_on_shutdown() {
        let queue = ReconciliationQueue::new();
        let (tx, mut rx) = watch::channel(false);
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next(&mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(result.is_none());
    }
}
