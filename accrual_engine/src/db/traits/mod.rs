//! # Store contracts
//!
//! This module defines the interfaces that database backends expose to the accrual engine.
//!
//! * [`OrderManagement`] is the order store: creating orders, looking them up, and moving them between
//!   non-crediting statuses.
//! * [`LedgerManagement`] is the bonus ledger: accounts, the append-only operation log, and the atomic crediting
//!   transaction that finalises a processed order.
//!
//! [`AccrualDatabase`] bundles both, and is what the reconciliation engine and the public APIs are generic over.
mod ledger_management;
mod order_management;

pub use ledger_management::LedgerManagement;
pub use order_management::OrderManagement;

/// A complete backend for the accrual engine. Implemented automatically for anything that provides both stores and can
/// be shared between workers.
pub trait AccrualDatabase: OrderManagement + LedgerManagement + Clone + Send + Sync + 'static {}

impl<T> AccrualDatabase for T where T: OrderManagement + LedgerManagement + Clone + Send + Sync + 'static {}
