use std::future::Future;

use crate::db_types::{BonusAccount, CreditOutcome, Operation, OrderNumber, Points, WithdrawalOutcome};

/// The `LedgerManagement` trait defines the behaviour of the bonus ledger: user bonus accounts and the append-only log
/// of accrual and withdrawal operations.
///
/// Every balance change happens in the same atomic transaction that appends the corresponding [`Operation`], so the
/// balance always equals the sum of accruals minus the sum of withdrawals for the account.
pub trait LedgerManagement {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the bonus account for the user, creating an empty one if none exists yet.
    fn fetch_or_create_bonus_account(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<BonusAccount, Self::Error>> + Send;

    /// In a single atomic transaction:
    /// * fetches (or creates) the user's bonus account,
    /// * appends an accrual entry of `amount` for `order_number`, unless one already exists,
    /// * increases the account balance by `amount` if the entry was appended,
    /// * marks the order as `PROCESSED` with the given accrual.
    ///
    /// The storage layer guarantees at most one accrual entry per order number, so concurrent callers (even in
    /// different processes) cannot double-credit an order. Either everything is applied, or nothing is.
    fn credit_accrual(
        &self,
        user_id: i64,
        order_number: &OrderNumber,
        amount: Points,
    ) -> impl Future<Output = Result<CreditOutcome, Self::Error>> + Send;

    /// Debits `amount` from the user's bonus account and appends a withdrawal entry, atomically. If the balance does
    /// not cover `amount`, nothing is written and [`WithdrawalOutcome::InsufficientFunds`] is returned.
    fn withdraw(
        &self,
        user_id: i64,
        order_number: &OrderNumber,
        amount: Points,
    ) -> impl Future<Output = Result<WithdrawalOutcome, Self::Error>> + Send;

    /// Withdrawal entries for the user, most recent first.
    fn fetch_withdrawals(&self, user_id: i64) -> impl Future<Output = Result<Vec<Operation>, Self::Error>> + Send;

    /// The sum of all withdrawals made by the user.
    fn total_withdrawn(&self, user_id: i64) -> impl Future<Output = Result<Points, Self::Error>> + Send;

    /// Every ledger entry that references the given order number.
    fn fetch_operations_for_order(
        &self,
        order_number: &OrderNumber,
    ) -> impl Future<Output = Result<Vec<Operation>, Self::Error>> + Send;
}
