//! # Accrual oracle
//!
//! The accrual oracle is an external, independently operated service that decides whether (and how many) bonus points
//! an order earns. It decides at its own pace, may rate-limit us, and may be unavailable.
//!
//! [`AccrualOracle`] is the seam between the reconciliation engine and the oracle. Implementations translate whatever
//! happens on the wire into an [`OracleOutcome`] and never fail in any other way. They make exactly one request per
//! call and never retry internally: retries and rate-limit pauses are the engine's job.
//!
//! [`HttpOracleClient`] is the production implementation.
use std::{fmt::Display, future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::db_types::{OrderNumber, Points};

mod http_client;

pub use http_client::{HttpOracleClient, OracleClientConfig, OracleClientError};

pub trait AccrualOracle: Send + Sync + 'static {
    /// Asks the oracle for its current verdict on the order.
    fn check_order(&self, number: &OrderNumber) -> impl Future<Output = OracleOutcome> + Send;
}

/// The oracle's own view of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl Display for OracleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleStatus::Registered => write!(f, "REGISTERED"),
            OracleStatus::Processing => write!(f, "PROCESSING"),
            OracleStatus::Invalid => write!(f, "INVALID"),
            OracleStatus::Processed => write!(f, "PROCESSED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleVerdict {
    pub status: OracleStatus,
    /// Only meaningful when `status` is `Processed`.
    pub accrual: Option<Points>,
}

impl OracleVerdict {
    pub fn new(status: OracleStatus, accrual: Option<Points>) -> Self {
        Self { status, accrual }
    }

    pub fn processing() -> Self {
        Self::new(OracleStatus::Processing, None)
    }

    pub fn invalid() -> Self {
        Self::new(OracleStatus::Invalid, None)
    }

    pub fn processed(accrual: Points) -> Self {
        Self::new(OracleStatus::Processed, Some(accrual))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    /// The oracle returned a decision, final or intermediate.
    Verdict(OracleVerdict),
    /// The oracle asked us to back off. No further calls may be made by anyone until `retry_after` has elapsed.
    RateLimited { retry_after: Duration },
    /// Network error, timeout or server error. Worth retrying later.
    TransientFailure(String),
    /// Malformed response or a client error other than a rate limit. Retrying will not help.
    PermanentFailure(String),
}

impl OracleOutcome {
    /// The oracle has no record of the order yet. This is indistinguishable from an order that is still being
    /// processed, so it is reported as such.
    pub fn unknown() -> Self {
        Self::Verdict(OracleVerdict::processing())
    }
}

impl Display for OracleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleOutcome::Verdict(OracleVerdict { status, accrual: Some(a) }) => write!(f, "{status} ({a})"),
            OracleOutcome::Verdict(OracleVerdict { status, accrual: None }) => write!(f, "{status}"),
            OracleOutcome::RateLimited { retry_after } => write!(f, "rate limited for {}ms", retry_after.as_millis()),
            OracleOutcome::TransientFailure(e) => write!(f, "transient failure: {e}"),
            OracleOutcome::PermanentFailure(e) => write!(f, "permanent failure: {e}"),
        }
    }
}
