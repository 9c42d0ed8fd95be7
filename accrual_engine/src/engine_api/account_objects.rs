use serde::Serialize;

use crate::db_types::{Order, Points};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    /// The points available to spend
    pub current: Points,
    /// The sum of all withdrawals made so far
    pub withdrawn: Points,
}

#[derive(Debug, Clone)]
pub enum SubmitOrderResult {
    /// The order is new, and has been handed to the reconciliation engine.
    Accepted(Order),
    /// The same user submitted this order before. Nothing changed.
    AlreadySubmitted(Order),
}

impl SubmitOrderResult {
    pub fn order(&self) -> &Order {
        match self {
            SubmitOrderResult::Accepted(o) | SubmitOrderResult::AlreadySubmitted(o) => o,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, SubmitOrderResult::Accepted(_))
    }
}
