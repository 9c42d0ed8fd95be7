use thiserror::Error;

use crate::db_types::OrderNumber;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Could not create bonus account for user #{0}")]
    AccountCreationError(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("Order {number} belongs to user #{owner}, not user #{user_id}")]
    OrderOwnerMismatch { number: OrderNumber, owner: i64, user_id: i64 },
}
