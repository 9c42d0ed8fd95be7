//! Balances, withdrawals and the bonus ledger.

use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{AccrualDatabase, LedgerManagement},
    db_types::{Operation, OrderNumber, Points, WithdrawalOutcome},
    engine_api::{account_objects::BalanceSummary, errors::AccountApiError},
    helpers::parse_order_number,
};

pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccrualDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The user's current balance and the total withdrawn. Users without an account get an empty one.
    pub async fn balance(&self, user_id: i64) -> Result<BalanceSummary, AccountApiError> {
        let account = self.db.fetch_or_create_bonus_account(user_id).await.map_err(db_error)?;
        let withdrawn = self.db.total_withdrawn(user_id).await.map_err(db_error)?;
        Ok(BalanceSummary { current: account.balance, withdrawn })
    }

    /// Spends `amount` points against `order_number`.
    pub async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: Points,
    ) -> Result<Operation, AccountApiError> {
        let number = parse_order_number(order_number)
            .ok_or_else(|| AccountApiError::InvalidOrderNumber(order_number.trim().to_string()))?;
        if !amount.is_positive() {
            return Err(AccountApiError::InvalidAmount(amount));
        }
        match self.db.withdraw(user_id, &number, amount).await.map_err(db_error)? {
            WithdrawalOutcome::Completed(op) => {
                debug!("🧑️ User #{user_id} withdrew {amount} against order {number}");
                Ok(op)
            },
            WithdrawalOutcome::InsufficientFunds { requested, balance } => {
                Err(AccountApiError::InsufficientFunds { requested, balance })
            },
        }
    }

    /// The user's withdrawals, most recent first.
    pub async fn withdrawals(&self, user_id: i64) -> Result<Vec<Operation>, AccountApiError> {
        self.db.fetch_withdrawals(user_id).await.map_err(db_error)
    }

    /// Every ledger entry, accrual or withdrawal, that references `order_number`.
    pub async fn ledger_for_order(&self, order_number: &str) -> Result<Vec<Operation>, AccountApiError> {
        let number = OrderNumber::from(order_number.trim());
        self.db.fetch_operations_for_order(&number).await.map_err(db_error)
    }
}

fn db_error<E: std::error::Error>(e: E) -> AccountApiError {
    AccountApiError::DatabaseError(e.to_string())
}
