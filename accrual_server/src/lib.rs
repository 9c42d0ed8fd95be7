//! # Accrual server
//! This crate hosts the long-running process for the loyalty points service. It is responsible for:
//! Opening (and migrating) the ledger database.
//! Starting the reconciliation engine against the configured accrual system.
//! Re-admitting orders that were left unfinished by a previous run, at start-up and periodically afterwards.
//! Shutting the engine down cleanly on Ctrl-C.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod server;
pub mod sweep_worker;
