use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{AccrualDatabase, OrderManagement},
    db_types::{InsertOrderResult, NewOrder, Order},
    engine_api::{account_objects::SubmitOrderResult, errors::OrderFlowError},
    helpers::parse_order_number,
    reconciler::ReconcilerHandle,
};

/// `OrderFlowApi` is the entry point for orders. Every order that reaches the reconciliation engine passes through
/// [`Self::submit_order`], which guarantees that only Luhn-valid numbers are ever queued.
pub struct OrderFlowApi<B> {
    db: B,
    engine: ReconcilerHandle<B>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B>
where B: AccrualDatabase
{
    pub fn new(db: B, engine: ReconcilerHandle<B>) -> Self {
        Self { db, engine }
    }

    /// Submit an order number on behalf of a user.
    ///
    /// Surrounding whitespace is ignored. Numbers that are not all digits or fail the Luhn check are rejected.
    /// Submitting the same number twice is harmless, but a number that belongs to another user is refused.
    pub async fn submit_order(&self, user_id: i64, number: &str) -> Result<SubmitOrderResult, OrderFlowError> {
        let number =
            parse_order_number(number).ok_or_else(|| OrderFlowError::InvalidOrderNumber(number.trim().to_string()))?;
        let result = self
            .db
            .insert_order(NewOrder::new(number, user_id))
            .await
            .map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?;
        match result {
            InsertOrderResult::Inserted(order) => {
                if self.engine.enqueue(order.number.clone(), user_id) {
                    debug!("📦️ Order {} for user #{user_id} accepted", order.number);
                } else {
                    warn!(
                        "📦️ Order {} was saved, but the engine is shutting down. It will be picked up on restart.",
                        order.number
                    );
                }
                Ok(SubmitOrderResult::Accepted(order))
            },
            InsertOrderResult::AlreadyExists(order) if order.user_id == user_id => {
                trace!("📦️ Order {} was already submitted by user #{user_id}", order.number);
                Ok(SubmitOrderResult::AlreadySubmitted(order))
            },
            InsertOrderResult::AlreadyExists(order) => {
                info!("📦️ User #{user_id} tried to submit order {}, which belongs to another user", order.number);
                Err(OrderFlowError::OrderOwnedByAnotherUser(order.number))
            },
        }
    }

    /// The user's orders, most recent first.
    pub async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderFlowError> {
        self.db.fetch_orders_for_user(user_id).await.map_err(|e| OrderFlowError::DatabaseError(e.to_string()))
    }

    pub async fn order_by_number(&self, number: &str) -> Result<Option<Order>, OrderFlowError> {
        let number =
            parse_order_number(number).ok_or_else(|| OrderFlowError::InvalidOrderNumber(number.trim().to_string()))?;
        self.db.fetch_order_by_number(&number).await.map_err(|e| OrderFlowError::DatabaseError(e.to_string()))
    }
}
