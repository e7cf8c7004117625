//! Points-economy backend for a game community shop.
//!
//! Players earn points from interval rewards, trades and payment webhooks,
//! and spend them on in-game items delivered over an RCON command channel.
//! The core is the ledger + delivery-guarantee engine:
//! - an append-only transaction ledger with derived, audited balances,
//! - a debit protocol that serializes per player so accounts never overdraw,
//! - a delivery pipeline that parks unreachable purchases in a durable
//!   pending queue instead of losing or re-charging them,
//! - an operator flush that re-attempts every pending delivery once,
//! - a sliding-window limiter on manual credit recovery.

pub mod config;
pub mod credit;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod messages;
pub mod pending;
pub mod purchase;
pub mod retry_limit;
pub mod server;
pub mod shop;
pub mod types;
pub mod util;

#[cfg(test)]
mod tests;

pub use config::{
    PurchaseConfig, RewardConfig, ShopConfig, DEFAULT_BIND_ADDR, DEFAULT_CONTEXTS,
    DEFAULT_DATA_DIR, DEFAULT_REWARD_INTERVAL_MINUTES, DEFAULT_REWARD_POINTS,
};
pub use credit::{CreditPayload, CreditReceipt};
pub use delivery::{DeliveryExecutor, DeliveryOutcome};
pub use error::ShopError;
pub use identity::{IdentityDirectory, IdentityDirectoryFile, IdentityRecord};
pub use ledger::{
    JsonLedgerStore, Ledger, LedgerAuditReport, LedgerAuditViolation, LedgerLog, LedgerReceipt,
    LedgerStore, MemoryLedgerStore, Transaction, LEDGER_LOG_VERSION,
};
pub use messages::ShopMessages;
pub use pending::{
    FlushReport, JsonQueueStore, MemoryQueueStore, PendingDelivery, PendingDeliveryQueue,
    PendingLog, PendingStatus, QueueStore, PENDING_LOG_VERSION,
};
pub use purchase::{
    resolve_command, ConfirmedPurchase, PurchaseSession, PurchaseSessionState, PurchaseSessions,
    DEFAULT_SESSION_TTL_MS,
};
pub use retry_limit::{
    RetryDecision, RetryLimiterConfig, RetryRateLimiter, DEFAULT_RETRY_CAP,
    DEFAULT_RETRY_WINDOW_MS,
};
pub use server::{
    ShopRequest, ShopResponse, ShopServer, ShopServerConfig, ShopServerError,
    SHOP_PROTOCOL_VERSION,
};
pub use shop::{PointShop, PurchaseReceipt, RewardSweepReport, TradeReceipt};
pub use types::{
    PendingDeliveryId, SessionId, TransactionId, TransactionStatus, UnixMillis,
};
pub use util::now_unix_ms;
