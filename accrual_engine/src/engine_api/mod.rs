//! The public API of the accrual engine.
//!
//! * [`OrderFlowApi`](order_flow_api::OrderFlowApi) validates and stores submitted orders and hands them to the
//!   reconciliation engine.
//! * [`AccountApi`](accounts_api::AccountApi) exposes bonus balances, withdrawals and the ledger.
//!
//! Both are generic over the database backend, so anything implementing
//! [`AccrualDatabase`](crate::AccrualDatabase) can be used.
pub mod account_objects;
pub mod accounts_api;
pub mod errors;
pub mod order_flow_api;
