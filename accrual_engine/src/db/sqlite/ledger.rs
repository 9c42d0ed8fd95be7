use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{BonusAccount, Operation, OperationKind, OrderNumber, Points},
};

const ACCOUNT_COLUMNS: &str = "id, user_id, balance, created_at, updated_at";
const OPERATION_COLUMNS: &str = "id, kind, order_number, amount, account_id, processed_at";

pub async fn bonus_account_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<BonusAccount>, SqliteDatabaseError> {
    let account =
        sqlx::query_as::<_, BonusAccount>(&format!("SELECT {ACCOUNT_COLUMNS} FROM bonus_accounts WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    Ok(account)
}

/// Fetches the bonus account for the user, creating it first if necessary.
///
/// The insert is issued before the select, so that inside a transaction the write lock is taken up front rather than
/// upgraded from a read lock half-way through.
pub async fn fetch_or_create_account(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<BonusAccount, SqliteDatabaseError> {
    let created = sqlx::query("INSERT INTO bonus_accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if created.rows_affected() > 0 {
        debug!("🧑️ Created bonus account for user #{user_id}");
    }
    bonus_account_for_user(user_id, conn).await?.ok_or(SqliteDatabaseError::AccountCreationError(user_id))
}

/// Appends an accrual entry for the order, unless one already exists. Returns `true` if the entry was appended.
///
/// Relies on the partial unique index on `operations(order_number) WHERE kind = 'accrual'`.
pub async fn append_accrual(
    account_id: i64,
    order_number: &OrderNumber,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "INSERT INTO operations (kind, order_number, amount, account_id) VALUES ($1, $2, $3, $4) ON CONFLICT DO \
         NOTHING",
    )
    .bind(OperationKind::Accrual)
    .bind(order_number)
    .bind(amount)
    .bind(account_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn append_withdrawal(
    account_id: i64,
    order_number: &OrderNumber,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<Operation, SqliteDatabaseError> {
    let op = sqlx::query_as::<_, Operation>(&format!(
        "INSERT INTO operations (kind, order_number, amount, account_id) VALUES ($1, $2, $3, $4) RETURNING \
         {OPERATION_COLUMNS}"
    ))
    .bind(OperationKind::Withdrawal)
    .bind(order_number)
    .bind(amount)
    .bind(account_id)
    .fetch_one(conn)
    .await?;
    Ok(op)
}

pub async fn incr_balance(
    account_id: i64,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE bonus_accounts SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(amount)
        .bind(account_id)
        .execute(conn)
        .await?;
    trace!("🧑️ Account #{account_id} credited with {amount}");
    Ok(())
}

/// Decreases the balance by `amount` only if the balance covers it. Returns `false` (and changes nothing) otherwise.
pub async fn try_decr_balance(
    account_id: i64,
    amount: Points,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE bonus_accounts SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND balance >= \
         $1",
    )
    .bind(amount)
    .bind(account_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn withdrawals_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Operation>, SqliteDatabaseError> {
    let ops = sqlx::query_as::<_, Operation>(&format!(
        "SELECT {OPERATION_COLUMNS} FROM operations WHERE kind = $1 AND account_id = (SELECT id FROM bonus_accounts \
         WHERE user_id = $2) ORDER BY processed_at DESC, id DESC"
    ))
    .bind(OperationKind::Withdrawal)
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(ops)
}

pub async fn total_withdrawn_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Points, SqliteDatabaseError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM operations WHERE kind = $1 AND account_id = (SELECT id FROM \
         bonus_accounts WHERE user_id = $2)",
    )
    .bind(OperationKind::Withdrawal)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(Points::from_cents(total))
}

pub async fn operations_for_order(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Vec<Operation>, SqliteDatabaseError> {
    let ops = sqlx::query_as::<_, Operation>(&format!(
        "SELECT {OPERATION_COLUMNS} FROM operations WHERE order_number = $1 ORDER BY id ASC"
    ))
    .bind(order_number)
    .fetch_all(conn)
    .await?;
    Ok(ops)
}
