use std::fmt::Display;

use tokio::time::Instant;

use crate::db_types::{Order, OrderNumber};

/// A request to ask the oracle about one order. Tasks only live in memory; any order that is still `NEW` or
/// `PROCESSING` can be turned back into a task after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationTask {
    pub order_number: OrderNumber,
    pub user_id: i64,
    /// The number of consecutive failed attempts. Reset whenever the oracle gives an answer.
    pub attempt: u32,
    /// The task is not eligible to be processed before this time.
    pub not_before: Option<Instant>,
}

impl ReconciliationTask {
    pub fn new(order_number: OrderNumber, user_id: i64) -> Self {
        Self { order_number, user_id, attempt: 0, not_before: None }
    }

    pub fn for_order(order: &Order) -> Self {
        Self::new(order.number.clone(), order.user_id)
    }
}

impl Display for ReconciliationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task(order {}, user #{}, attempt {})", self.order_number, self.user_id, self.attempt)
    }
}
