//! Core identifier aliases and status tags.

use serde::{Deserialize, Serialize};

pub type TransactionId = u64;
pub type PendingDeliveryId = u64;
pub type SessionId = u64;
pub type UnixMillis = i64;

/// Provenance tag recorded with every ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Purchase delivered on the first attempt.
    Success,
    /// Purchase paid for but parked in the pending delivery queue.
    Queued,
    TradeSent,
    TradeReceived,
    IntervalReward,
    /// Human-triggered replay of a failed external credit.
    ManualRetry,
    /// Credit posted by the tip4serv payment webhook.
    #[serde(rename = "tip4serv")]
    Tip4Serv,
}
