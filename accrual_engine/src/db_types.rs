use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use lp_common::Points;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------     OrderNumber       ---------------------------------------------------------
/// An externally supplied order number. Only the ingestion API checks the Luhn checksum; everything downstream trusts
/// that numbers reaching the store are valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatusType {
    /// The order has been submitted and not yet seen by the accrual oracle.
    New,
    /// The oracle has registered the order but has not reached a verdict.
    Processing,
    /// The oracle rejected the order. No points will be credited.
    Invalid,
    /// The oracle accepted the order and the accrual has been credited.
    Processed,
}

impl OrderStatusType {
    /// `Invalid` and `Processed` orders never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::New => write!(f, "NEW"),
            OrderStatusType::Processing => write!(f, "PROCESSING"),
            OrderStatusType::Invalid => write!(f, "INVALID"),
            OrderStatusType::Processed => write!(f, "PROCESSED"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "INVALID" => Ok(Self::Invalid),
            "PROCESSED" => Ok(Self::Processed),
            _ => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub number: OrderNumber,
    /// The user that submitted the order. Never changes once the order exists.
    pub user_id: i64,
    pub status: OrderStatusType,
    /// Only set once the order is `Processed`.
    pub accrual: Option<Points>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub user_id: i64,
}

impl NewOrder {
    pub fn new(number: OrderNumber, user_id: i64) -> Self {
        Self { number, user_id }
    }
}

//--------------------------------------     BonusAccount       -------------------------------------------------------
/// A user's bonus points account. `balance` is a projection of the ledger, and is only ever changed in the same
/// transaction that appends an [`Operation`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BonusAccount {
    pub id: i64,
    pub user_id: i64,
    pub balance: Points,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    OperationKind      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Accrual,
    Withdrawal,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Accrual => write!(f, "accrual"),
            OperationKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

//--------------------------------------       Operation       --------------------------------------------------------
/// An append-only ledger entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Operation {
    pub id: i64,
    pub kind: OperationKind,
    pub order_number: OrderNumber,
    pub amount: Points,
    pub account_id: i64,
    pub processed_at: DateTime<Utc>,
}

//--------------------------------------     CreditOutcome      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// A new accrual entry was appended and the balance increased.
    Credited,
    /// An accrual entry for the order already existed. The order status was still finalised, but no points moved.
    AlreadyCredited,
}

//--------------------------------------   WithdrawalOutcome    -------------------------------------------------------
#[derive(Debug, Clone)]
pub enum WithdrawalOutcome {
    Completed(Operation),
    /// Nothing was written.
    InsufficientFunds { requested: Points, balance: Points },
}

#[derive(Debug, Clone)]
pub enum InsertOrderResult {
    Inserted(Order),
    AlreadyExists(Order),
}
