//! Shared test doubles and wiring helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use point_shop_rcon::{CommandChannel, RconError};

use crate::delivery::DeliveryExecutor;
use crate::identity::{IdentityDirectory, IdentityRecord};
use crate::ledger::{Ledger, MemoryLedgerStore};
use crate::messages::ShopMessages;
use crate::pending::{MemoryQueueStore, PendingDeliveryQueue};
use crate::purchase::{PurchaseSessions, DEFAULT_SESSION_TTL_MS};
use crate::retry_limit::{RetryLimiterConfig, RetryRateLimiter};
use crate::shop::PointShop;

/// Channel double: plays back a script of outcomes, then a fixed fallback,
/// recording every command it was asked to send.
pub(crate) struct ScriptedChannel {
    script: Mutex<VecDeque<Result<String, RconError>>>,
    fallback: Result<String, RconError>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    /// Every send succeeds.
    pub(crate) fn healthy() -> Self {
        Self::with_fallback(Ok(String::new()))
    }

    /// Every send fails like an unreachable server.
    pub(crate) fn failing() -> Self {
        Self::with_fallback(Self::io_err())
    }

    /// Scripted outcomes first, success afterwards.
    pub(crate) fn script(outcomes: impl IntoIterator<Item = Result<String, RconError>>) -> Self {
        let channel = Self::with_fallback(Ok(String::new()));
        {
            let mut script = channel.script.lock().expect("script lock");
            script.extend(outcomes);
        }
        channel
    }

    pub(crate) fn io_err() -> Result<String, RconError> {
        Err(RconError::Io("connection refused".to_string()))
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn with_fallback(fallback: Result<String, RconError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl CommandChannel for ScriptedChannel {
    fn send(&self, command: &str) -> Result<String, RconError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push(command.to_string());
        let mut script = self.script.lock().expect("script lock");
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Two linked players and one pseudonym-less account.
pub(crate) fn test_directory() -> IdentityDirectory {
    IdentityDirectory::from_records(vec![
        IdentityRecord {
            player_id: "eos-1".to_string(),
            discord_id: Some("d-100".to_string()),
            steam_id: Some("s-100".to_string()),
            xuid: None,
            pseudo: Some("Alice".to_string()),
        },
        IdentityRecord {
            player_id: "eos-2".to_string(),
            discord_id: Some("d-200".to_string()),
            steam_id: None,
            xuid: Some("x-200".to_string()),
            pseudo: Some("Bob".to_string()),
        },
        IdentityRecord {
            player_id: "eos-3".to_string(),
            discord_id: None,
            steam_id: None,
            xuid: None,
            pseudo: None,
        },
    ])
}

/// A fully wired shop over memory stores and the given channel double.
pub(crate) fn shop_with_channel(channel: ScriptedChannel) -> (PointShop, Arc<ScriptedChannel>) {
    let channel = Arc::new(channel);
    let shop = PointShop::new(
        Ledger::open(Arc::new(MemoryLedgerStore::new())).expect("open ledger"),
        PendingDeliveryQueue::open(Arc::new(MemoryQueueStore::new())).expect("open queue"),
        DeliveryExecutor::new(channel.clone()),
        RetryRateLimiter::new(RetryLimiterConfig::default()),
        test_directory(),
        PurchaseSessions::new(DEFAULT_SESSION_TTL_MS, Vec::new()),
        ShopMessages::default(),
    );
    (shop, channel)
}
