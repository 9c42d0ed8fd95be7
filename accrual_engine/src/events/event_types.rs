use serde::Serialize;

use crate::db_types::{OrderNumber, OrderStatusType, Points};

/// A processed order's accrual was appended to the ledger and added to the owner's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccrualCreditedEvent {
    pub user_id: i64,
    pub order_number: OrderNumber,
    pub amount: Points,
}

impl AccrualCreditedEvent {
    pub fn new(user_id: i64, order_number: OrderNumber, amount: Points) -> Self {
        Self { user_id, order_number, amount }
    }
}

/// An order reached `INVALID` or `PROCESSED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFinalizedEvent {
    pub user_id: i64,
    pub order_number: OrderNumber,
    pub status: OrderStatusType,
    pub accrual: Option<Points>,
}

impl OrderFinalizedEvent {
    pub fn new(user_id: i64, order_number: OrderNumber, status: OrderStatusType, accrual: Option<Points>) -> Self {
        Self { user_id, order_number, status, accrual }
    }
}

/// The engine gave up on an order without a verdict. The order is left in its last known status for manual
/// inspection, and the periodic sweep will pick it up again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAbandonedEvent {
    pub user_id: i64,
    pub order_number: OrderNumber,
    /// The number of failed attempts made before giving up
    pub attempts: u32,
    pub reason: String,
}

impl OrderAbandonedEvent {
    pub fn new(user_id: i64, order_number: OrderNumber, attempts: u32, reason: String) -> Self {
        Self { user_id, order_number, attempts, reason }
    }
}
