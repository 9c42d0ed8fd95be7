use std::time::Duration;

use log::*;
use rand::Rng;
use tokio::{sync::watch, time::Instant};

use super::{queue::wait_for_shutdown, ReconciliationQueue, ReconciliationTask};

const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_CAP: Duration = Duration::from_secs(60);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_JITTER: f64 = 0.1;

/// Exponential backoff with a ceiling.
///
/// `delay(n) = min(cap, base * 2^(n-1))` for the n-th consecutive failure. [`jittered_delay`](Self::jittered_delay)
/// adds up to `jitter * delay` on top, without ever exceeding the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    /// A ratio in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: DEFAULT_BASE, cap: DEFAULT_CAP, max_attempts: DEFAULT_MAX_ATTEMPTS, jitter: DEFAULT_JITTER }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self { base, cap, max_attempts, jitter: 0.0 }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.checked_mul(1u32 << exponent).map_or(self.cap, |d| d.min(self.cap))
    }

    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = delay.mul_f64(rand::thread_rng().gen_range(0.0..=self.jitter));
        (delay + extra).min(self.cap)
    }

    /// True once a task has failed as often as it is allowed to.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Holds tasks until they are due and then hands them back to the queue. It knows nothing about orders.
///
/// Scheduled tasks are dropped when the engine shuts down. They are not lost: their orders are still `NEW` or
/// `PROCESSING` in the store and are recovered on the next start.
#[derive(Clone)]
pub struct RetryScheduler {
    queue: ReconciliationQueue,
    shutdown: watch::Receiver<bool>,
}

impl RetryScheduler {
    pub fn new(queue: ReconciliationQueue, shutdown: watch::Receiver<bool>) -> Self {
        Self { queue, shutdown }
    }

    pub fn schedule(&self, mut task: ReconciliationTask, delay: Duration) {
        let due = Instant::now() + delay;
        task.not_before = Some(due);
        trace!("⏳️ {task} is due again in {}ms", delay.as_millis());
        let queue = self.queue.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(due) => {
                    let number = task.order_number.clone();
                    if !queue.requeue(task) {
                        debug!("⏳️ Retry for order {number} was dropped because the engine is shutting down");
                    }
                },
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!("⏳️ Dropping scheduled retry for order {}", task.order_number);
                },
            }
        });
    }
}
