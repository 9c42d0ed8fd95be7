use std::future::Future;

use crate::db_types::{InsertOrderResult, NewOrder, Order, OrderNumber, OrderStatusType};

/// The `OrderManagement` trait defines the behaviour for storing and querying orders in the database backend.
///
/// Orders are never deleted. Apart from creation, the only mutation the reconciliation engine performs through this
/// trait is [`update_order_status`](OrderManagement::update_order_status) for non-crediting transitions. Crediting
/// transitions go through [`LedgerManagement::credit_accrual`](crate::LedgerManagement::credit_accrual).
pub trait OrderManagement {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stores a new order with status `NEW`. If an order with the same number already exists, nothing is written and
    /// the existing order is returned in [`InsertOrderResult::AlreadyExists`].
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<InsertOrderResult, Self::Error>> + Send;

    fn fetch_order_by_number(
        &self,
        number: &OrderNumber,
    ) -> impl Future<Output = Result<Option<Order>, Self::Error>> + Send;

    /// All orders for the given user, most recent first.
    fn fetch_orders_for_user(&self, user_id: i64) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send;

    /// All orders that are still awaiting a verdict (`NEW` or `PROCESSING`), oldest first.
    fn fetch_pending_orders(&self) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send;

    /// Sets the status of a non-terminal order. Terminal orders are left untouched, and `false` is returned.
    fn update_order_status(
        &self,
        number: &OrderNumber,
        status: OrderStatusType,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}
