use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::{ledger, new_pool, orders, orders::OrderQueryFilter, SqliteDatabaseError};
use crate::{
    db::traits::{LedgerManagement, OrderManagement},
    db_types::{
        BonusAccount,
        CreditOutcome,
        InsertOrderResult,
        NewOrder,
        Operation,
        Order,
        OrderNumber,
        OrderStatusType,
        Points,
        WithdrawalOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_number(number, &mut conn).await
    }

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let query = OrderQueryFilter::default().with_user_id(user_id).newest_first();
        orders::fetch_orders(query, &mut conn).await
    }

    async fn fetch_pending_orders(&self) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let query =
            OrderQueryFilter::default().with_status(OrderStatusType::New).with_status(OrderStatusType::Processing);
        orders::fetch_orders(query, &mut conn).await
    }

    async fn update_order_status(&self, number: &OrderNumber, status: OrderStatusType) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        trace!("🗃️ Order {number} moving to {status}");
        let updated = orders::update_order_status(number, status, &mut conn).await?;
        if !updated {
            debug!("🗃️ Order {number} was not updated to {status}. It is either missing or already final.");
        }
        Ok(updated)
    }
}

impl LedgerManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn fetch_or_create_bonus_account(&self, user_id: i64) -> Result<BonusAccount, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_or_create_account(user_id, &mut conn).await
    }

    async fn credit_accrual(
        &self,
        user_id: i64,
        order_number: &OrderNumber,
        amount: Points,
    ) -> Result<CreditOutcome, Self::Error> {
        if amount.is_negative() {
            return Err(SqliteDatabaseError::QueryError(format!("Cannot credit a negative accrual of {amount}")));
        }
        let mut tx = self.pool.begin().await?;
        let account = ledger::fetch_or_create_account(user_id, &mut tx).await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order_number.clone()))?;
        if order.user_id != user_id {
            return Err(SqliteDatabaseError::OrderOwnerMismatch {
                number: order_number.clone(),
                owner: order.user_id,
                user_id,
            });
        }
        let appended = ledger::append_accrual(account.id, order_number, amount, &mut tx).await?;
        if appended {
            ledger::incr_balance(account.id, amount, &mut tx).await?;
        } else {
            warn!("🗃️ Order {order_number} already has an accrual entry. The balance will not be credited again.");
        }
        orders::mark_processed(order_number, amount, &mut tx).await?;
        tx.commit().await?;
        let outcome = if appended { CreditOutcome::Credited } else { CreditOutcome::AlreadyCredited };
        debug!("🗃️ Order {order_number} is PROCESSED. Accrual of {amount} for user #{user_id}: {outcome:?}");
        Ok(outcome)
    }

    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &OrderNumber,
        amount: Points,
    ) -> Result<WithdrawalOutcome, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let account = ledger::fetch_or_create_account(user_id, &mut tx).await?;
        if !ledger::try_decr_balance(account.id, amount, &mut tx).await? {
            debug!("🗃️ User #{user_id} cannot withdraw {amount}. Balance is {}", account.balance);
            tx.rollback().await?;
            return Ok(WithdrawalOutcome::InsufficientFunds { requested: amount, balance: account.balance });
        }
        let op = ledger::append_withdrawal(account.id, order_number, amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ User #{user_id} withdrew {amount} against order {order_number}");
        Ok(WithdrawalOutcome::Completed(op))
    }

    async fn fetch_withdrawals(&self, user_id: i64) -> Result<Vec<Operation>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::withdrawals_for_user(user_id, &mut conn).await
    }

    async fn total_withdrawn(&self, user_id: i64) -> Result<Points, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::total_withdrawn_for_user(user_id, &mut conn).await
    }

    async fn fetch_operations_for_order(&self, order_number: &OrderNumber) -> Result<Vec<Operation>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::operations_for_order(order_number, &mut conn).await
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date using the migrations embedded in this crate.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// The URL of the database
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::prepare_env::prepare_test_db;

    async fn new_order(db: &SqliteDatabase, number: &str, user_id: i64) -> Order {
        match db.insert_order(NewOrder::new(number.into(), user_id)).await.unwrap() {
            InsertOrderResult::Inserted(o) => o,
            InsertOrderResult::AlreadyExists(_) => panic!("Order {number} already exists"),
        }
    }

    #[tokio::test]
    async fn insert_order_is_idempotent() {
        let db = prepare_test_db().await;
        let order = new_order(&db, "61508349208", 1).await;
        assert_eq!(order.status, OrderStatusType::New);
        assert!(order.accrual.is_none());
        match db.insert_order(NewOrder::new("61508349208".into(), 2)).await.unwrap() {
            InsertOrderResult::AlreadyExists(o) => assert_eq!(o.user_id, 1),
            InsertOrderResult::Inserted(_) => panic!("Duplicate order was inserted"),
        }
    }

    #[tokio::test]
    async fn pending_orders_exclude_terminal_ones() {
        let db = prepare_test_db().await;
        new_order(&db, "24619735244", 1).await;
        new_order(&db, "62794305672", 1).await;
        new_order(&db, "61508349208", 2).await;
        assert!(db.update_order_status(&"62794305672".into(), OrderStatusType::Processing).await.unwrap());
        assert!(db.update_order_status(&"24619735244".into(), OrderStatusType::Invalid).await.unwrap());
        // Terminal orders never move again
        assert!(!db.update_order_status(&"24619735244".into(), OrderStatusType::Processing).await.unwrap());
        let pending = db.fetch_pending_orders().await.unwrap();
        let numbers = pending.iter().map(|o| o.number.as_str()).collect::<Vec<_>>();
        assert_eq!(numbers, vec!["62794305672", "61508349208"]);
        assert_eq!(db.fetch_orders_for_user(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn credit_accrual_happens_at_most_once() {
        let db = prepare_test_db().await;
        new_order(&db, "61508349208", 7).await;
        let number = OrderNumber::from("61508349208");
        let amount = Points::from_cents(12_345);
        assert_eq!(db.credit_accrual(7, &number, amount).await.unwrap(), CreditOutcome::Credited);
        assert_eq!(db.credit_accrual(7, &number, amount).await.unwrap(), CreditOutcome::AlreadyCredited);
        let account = db.fetch_or_create_bonus_account(7).await.unwrap();
        assert_eq!(account.balance, amount);
        let ops = db.fetch_operations_for_order(&number).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, crate::db_types::OperationKind::Accrual);
        let order = db.fetch_order_by_number(&number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Processed);
        assert_eq!(order.accrual, Some(amount));
    }

    #[tokio::test]
    async fn credit_accrual_rejects_wrong_owner_without_side_effects() {
        let db = prepare_test_db().await;
        new_order(&db, "61508349208", 7).await;
        let number = OrderNumber::from("61508349208");
        let err = db.credit_accrual(8, &number, Points::from_points(10)).await.unwrap_err();
        assert!(matches!(err, SqliteDatabaseError::OrderOwnerMismatch { owner: 7, .. }));
        assert!(db.fetch_operations_for_order(&number).await.unwrap().is_empty());
        let order = db.fetch_order_by_number(&number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::New);
    }

    #[tokio::test]
    async fn withdrawals_respect_the_balance() {
        let db = prepare_test_db().await;
        new_order(&db, "61508349208", 3).await;
        db.credit_accrual(3, &"61508349208".into(), Points::from_points(100)).await.unwrap();
        let refused = db.withdraw(3, &"2377225624".into(), Points::from_points(101)).await.unwrap();
        let expected = Points::from_points(100);
        assert!(matches!(refused, WithdrawalOutcome::InsufficientFunds { balance, .. } if balance == expected));
        match db.withdraw(3, &"2377225624".into(), Points::from_points(40)).await.unwrap() {
            WithdrawalOutcome::Completed(op) => assert_eq!(op.amount, Points::from_points(40)),
            other => panic!("Withdrawal was refused: {other:?}"),
        }
        db.withdraw(3, &"79927398713".into(), Points::from_cents(2_050)).await.unwrap();
        let account = db.fetch_or_create_bonus_account(3).await.unwrap();
        assert_eq!(account.balance, Points::from_cents(3_950));
        assert_eq!(db.total_withdrawn(3).await.unwrap(), Points::from_cents(6_050));
        let withdrawals = db.fetch_withdrawals(3).await.unwrap();
        assert_eq!(withdrawals.len(), 2);
        assert_eq!(withdrawals[0].order_number.as_str(), "79927398713");
    }
}
