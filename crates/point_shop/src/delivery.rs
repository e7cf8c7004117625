//! Single-attempt delivery over the remote command channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use point_shop_rcon::CommandChannel;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Queued,
}

/// Sends a resolved command exactly once.
///
/// Every transport failure is treated the same way: the purchase becomes a
/// pending delivery for a later flush. There is no retry and no backoff
/// here, and the executor never touches the ledger: it acts on a financial
/// fact the caller has already committed.
pub struct DeliveryExecutor {
    channel: Arc<dyn CommandChannel>,
}

impl DeliveryExecutor {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &dyn CommandChannel {
        self.channel.as_ref()
    }

    /// One send; any failure uniformly maps to `Queued`.
    pub fn attempt(&self, command: &str) -> DeliveryOutcome {
        match self.channel.send(command) {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(_) => DeliveryOutcome::Queued,
        }
    }

    /// Best-effort side message (chat feedback); reports whether it went
    /// through but never queues.
    pub fn notify(&self, command: &str) -> bool {
        self.channel.send(command).is_ok()
    }
}
