use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{InsertOrderResult, NewOrder, Order, OrderNumber, OrderStatusType, Points},
};

const ORDER_COLUMNS: &str = "id, number, user_id, status, accrual, created_at, updated_at";

/// Inserts the order if no order with the same number exists yet. The existing order is returned otherwise, so that
/// callers can decide whether the duplicate is benign (same owner) or a conflict.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    let inserted = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (number, user_id) VALUES ($1, $2) ON CONFLICT (number) DO NOTHING RETURNING \
         {ORDER_COLUMNS}"
    ))
    .bind(&order.number)
    .bind(order.user_id)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(o) => {
            debug!("🗃️ Order {} saved for user #{}", o.number, o.user_id);
            Ok(InsertOrderResult::Inserted(o))
        },
        None => {
            let existing = fetch_order_by_number(&order.number, conn)
                .await?
                .ok_or_else(|| SqliteDatabaseError::OrderNotFound(order.number.clone()))?;
            Ok(InsertOrderResult::AlreadyExists(existing))
        },
    }
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"))
        .bind(number)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    user_id: Option<i64>,
    statuses: Vec<OrderStatusType>,
    newest_first: bool,
}

impl OrderQueryFilter {
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.statuses.is_empty()
    }
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if !query.statuses.is_empty() {
        where_clause.push("status IN (");
        for (i, status) in query.statuses.iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status.to_string());
        }
        where_clause.push_unseparated(")");
    }
    if query.newest_first {
        builder.push(" ORDER BY created_at DESC, id DESC");
    } else {
        builder.push(" ORDER BY created_at ASC, id ASC");
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_orders: {}", orders.len());
    Ok(orders)
}

/// Moves a non-terminal order to `status`. Returns false if the order is missing or already terminal.
pub(crate) async fn update_order_status(
    number: &OrderNumber,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE number = $2 AND status IN ('NEW', \
         'PROCESSING')",
    )
    .bind(status)
    .bind(number)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Marks a pending order as `PROCESSED` with the given accrual. Re-applying to an order that is already terminal leaves
/// it untouched.
pub(crate) async fn mark_processed(
    number: &OrderNumber,
    accrual: Points,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let result = sqlx::query(
        "UPDATE orders SET status = 'PROCESSED', accrual = $1, updated_at = CURRENT_TIMESTAMP WHERE number = $2 AND \
         status IN ('NEW', 'PROCESSING')",
    )
    .bind(accrual)
    .bind(number)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 && fetch_order_by_number(number, conn).await?.is_none() {
        return Err(SqliteDatabaseError::OrderNotFound(number.clone()));
    }
    Ok(())
}
