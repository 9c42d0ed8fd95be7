use thiserror::Error;

use crate::db_types::{OrderNumber, Points};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is not a valid order number")]
    InvalidOrderNumber(String),
    #[error("Order {0} has already been submitted by another user")]
    OrderOwnedByAnotherUser(OrderNumber),
}

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is not a valid order number")]
    InvalidOrderNumber(String),
    #[error("Withdrawal amounts must be positive, not {0}")]
    InvalidAmount(Points),
    #[error("Insufficient funds. Requested {requested}, but the balance is {balance}")]
    InsufficientFunds { requested: Points, balance: Points },
}
