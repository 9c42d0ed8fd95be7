//! Accrual Engine
//!
//! The accrual engine reconciles the verdicts of an external accrual oracle into a bonus points ledger. Users submit
//! order numbers; the oracle decides, at its own pace, whether and how many points each order earns; and the engine
//! makes sure that every processed order is credited exactly once, however slow, rate-limited or flaky the oracle is.
//!
//! The library is divided into these main sections:
//! 1. Database management ([`mod@db`]). SQLite is the supported backend. Backends implement the [`OrderManagement`]
//!    and [`LedgerManagement`] traits. The data types used in the database are defined in [`mod@db_types`] and are
//!    public.
//! 2. The oracle client ([`mod@oracle`]), which translates whatever the oracle says into an [`OracleOutcome`].
//! 3. The reconciliation engine ([`mod@reconciler`]): the task queue, the worker pool, the retry scheduler and the
//!    global rate-limit gate.
//! 4. The public API ([`mod@engine_api`]) for submitting orders and managing bonus accounts.
//!
//! The engine also emits events that can be subscribed to (see [`mod@events`]), for example when an accrual is
//! credited, or when an order has to be abandoned.
mod db;

pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod oracle;
pub mod reconciler;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{AccrualDatabase, LedgerManagement, OrderManagement};
pub use engine_api::{
    account_objects::{BalanceSummary, SubmitOrderResult},
    accounts_api::AccountApi,
    errors::{AccountApiError, OrderFlowError},
    order_flow_api::OrderFlowApi,
};
pub use oracle::{AccrualOracle, HttpOracleClient, OracleClientConfig, OracleOutcome};
pub use reconciler::{Disposition, Reconciler, ReconcilerConfig, ReconcilerHandle, RetryPolicy};
