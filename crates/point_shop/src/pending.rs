//! Durable queue of paid-but-undelivered purchases.
//!
//! Every record here already has a matching negative ledger transaction;
//! the queue exists so a purchase whose command could not reach the game
//! server is neither lost nor re-charged. Recovery is the explicit
//! [`PendingDeliveryQueue::flush`]: one redelivery attempt per record per
//! call, never automatic.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use point_shop_rcon::CommandChannel;

use crate::error::ShopError;
use crate::types::{PendingDeliveryId, UnixMillis};
use crate::util::{read_json_from_path, write_json_to_path};

pub const PENDING_LOG_VERSION: u32 = 1;

fn default_pending_log_version() -> u32 {
    PENDING_LOG_VERSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Delivered,
}

/// A purchase that has been paid for but not yet executed in game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub id: PendingDeliveryId,
    pub player_id: String,
    pub item_name: String,
    /// Command with identity/context placeholders already substituted.
    pub command: String,
    pub context: String,
    pub price: i64,
    pub status: PendingStatus,
    pub timestamp_ms: UnixMillis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLog {
    #[serde(default = "default_pending_log_version")]
    pub version: u32,
    pub deliveries: Vec<PendingDelivery>,
}

impl PendingLog {
    pub fn new() -> Self {
        Self {
            version: PENDING_LOG_VERSION,
            deliveries: Vec::new(),
        }
    }

    pub(crate) fn validate_version(&self) -> Result<(), ShopError> {
        if self.version == PENDING_LOG_VERSION {
            Ok(())
        } else {
            Err(ShopError::Serde(format!(
                "unsupported pending log version {} (expected {})",
                self.version, PENDING_LOG_VERSION
            )))
        }
    }
}

impl Default for PendingLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage seam for the pending delivery log.
pub trait QueueStore: Send + Sync {
    fn load(&self) -> Result<PendingLog, ShopError>;
    fn save(&self, log: &PendingLog) -> Result<(), ShopError>;
}

/// JSON file store; a missing file is an empty queue.
#[derive(Debug, Clone)]
pub struct JsonQueueStore {
    path: PathBuf,
}

impl JsonQueueStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueueStore for JsonQueueStore {
    fn load(&self) -> Result<PendingLog, ShopError> {
        if !self.path.exists() {
            return Ok(PendingLog::new());
        }
        let log: PendingLog = read_json_from_path(&self.path)?;
        log.validate_version()?;
        Ok(log)
    }

    fn save(&self, log: &PendingLog) -> Result<(), ShopError> {
        write_json_to_path(log, &self.path)
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    log: Mutex<PendingLog>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Result<PendingLog, ShopError> {
        self.log
            .lock()
            .map(|log| log.clone())
            .map_err(|_| ShopError::LockPoisoned {
                what: "memory queue store".to_string(),
            })
    }

    fn save(&self, log: &PendingLog) -> Result<(), ShopError> {
        let mut slot = self.log.lock().map_err(|_| ShopError::LockPoisoned {
            what: "memory queue store".to_string(),
        })?;
        *slot = log.clone();
        Ok(())
    }
}

/// Result of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
}

#[derive(Debug)]
struct QueueState {
    next_id: PendingDeliveryId,
    log: PendingLog,
}

pub struct PendingDeliveryQueue {
    store: Arc<dyn QueueStore>,
    state: Mutex<QueueState>,
    flush_guard: Mutex<()>,
}

impl PendingDeliveryQueue {
    pub fn open(store: Arc<dyn QueueStore>) -> Result<Self, ShopError> {
        let log = store.load()?;
        let mut next_id = 1;
        for delivery in &log.deliveries {
            next_id = next_id.max(delivery.id.saturating_add(1));
        }
        Ok(Self {
            store,
            state: Mutex::new(QueueState { next_id, log }),
            flush_guard: Mutex::new(()),
        })
    }

    /// Record one paid-but-undelivered purchase. Called exactly once per
    /// failed delivery attempt; idempotency is the caller's contract.
    pub fn enqueue(
        &self,
        player_id: &str,
        item_name: &str,
        command: &str,
        context: &str,
        price: i64,
        now_ms: UnixMillis,
    ) -> Result<PendingDeliveryId, ShopError> {
        let mut state = self.state_guard()?;
        let delivery = PendingDelivery {
            id: state.next_id,
            player_id: player_id.to_string(),
            item_name: item_name.to_string(),
            command: command.to_string(),
            context: context.to_string(),
            price,
            status: PendingStatus::Pending,
            timestamp_ms: now_ms,
        };
        state.log.deliveries.push(delivery);
        if let Err(err) = self.store.save(&state.log) {
            state.log.deliveries.pop();
            return Err(err);
        }
        let id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        Ok(id)
    }

    /// Pending records in creation order.
    pub fn pending(&self) -> Vec<PendingDelivery> {
        self.state
            .lock()
            .map(|state| {
                state
                    .log
                    .deliveries
                    .iter()
                    .filter(|delivery| delivery.status == PendingStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    pub fn get(&self, id: PendingDeliveryId) -> Option<PendingDelivery> {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .log
                    .deliveries
                    .iter()
                    .find(|delivery| delivery.id == id)
                    .cloned()
            })
    }

    /// Re-attempt every pending record once, in creation order.
    ///
    /// Flushes serialize on their own guard; the record-state lock is never
    /// held across a channel send. A record is marked `delivered` (and
    /// persisted) immediately after its successful attempt, so a crash
    /// mid-flush cannot forget a delivery that happened.
    pub fn flush(&self, channel: &dyn CommandChannel) -> Result<FlushReport, ShopError> {
        let _flushing = self.flush_guard.lock().map_err(|_| ShopError::LockPoisoned {
            what: "pending flush guard".to_string(),
        })?;
        let batch = self.pending();
        let mut report = FlushReport {
            attempted: 0,
            delivered: 0,
        };
        for delivery in batch {
            report.attempted += 1;
            if channel.send(&delivery.command).is_ok() && self.mark_delivered(delivery.id)? {
                report.delivered += 1;
            }
        }
        Ok(report)
    }

    /// Transition `pending → delivered`; false if the record was not pending.
    fn mark_delivered(&self, id: PendingDeliveryId) -> Result<bool, ShopError> {
        let mut state = self.state_guard()?;
        let Some(index) = state
            .log
            .deliveries
            .iter()
            .position(|delivery| delivery.id == id && delivery.status == PendingStatus::Pending)
        else {
            return Ok(false);
        };
        state.log.deliveries[index].status = PendingStatus::Delivered;
        if let Err(err) = self.store.save(&state.log) {
            state.log.deliveries[index].status = PendingStatus::Pending;
            return Err(err);
        }
        Ok(true)
    }

    fn state_guard(&self) -> Result<MutexGuard<'_, QueueState>, ShopError> {
        self.state.lock().map_err(|_| ShopError::LockPoisoned {
            what: "pending queue state".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ScriptedChannel;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn memory_queue() -> PendingDeliveryQueue {
        PendingDeliveryQueue::open(Arc::new(MemoryQueueStore::new())).expect("open queue")
    }

    fn temp_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("point-shop-{prefix}-{unique}/pending.json"))
    }

    #[test]
    fn enqueue_records_pending_in_creation_order() {
        let queue = memory_queue();
        let first = queue
            .enqueue("eos-1", "Rex", "cmd-1", "The Island", 30, 1)
            .expect("enqueue");
        let second = queue
            .enqueue("eos-2", "Argy", "cmd-2", "Ragnarok", 10, 2)
            .expect("enqueue");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        let pending = queue.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].item_name, "Rex");
        assert_eq!(pending[1].item_name, "Argy");
        assert!(pending
            .iter()
            .all(|delivery| delivery.status == PendingStatus::Pending));
    }

    #[test]
    fn flush_delivers_pending_and_leaves_failures_pending() {
        let queue = memory_queue();
        queue
            .enqueue("eos-1", "Rex", "cmd-1", "The Island", 30, 1)
            .expect("enqueue");
        queue
            .enqueue("eos-2", "Argy", "cmd-2", "Ragnarok", 10, 2)
            .expect("enqueue");
        // First command goes through, second fails.
        let channel = ScriptedChannel::script([Ok(String::new()), ScriptedChannel::io_err()]);
        let report = queue.flush(&channel).expect("flush");
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.pending()[0].item_name, "Argy");
        assert_eq!(queue.get(1).expect("record").status, PendingStatus::Delivered);
    }

    #[test]
    fn repeated_flush_never_redelivers() {
        let queue = memory_queue();
        queue
            .enqueue("eos-1", "Rex", "cmd-1", "The Island", 30, 1)
            .expect("enqueue");
        let channel = ScriptedChannel::healthy();
        let first = queue.flush(&channel).expect("flush");
        assert_eq!(first.delivered, 1);
        let second = queue.flush(&channel).expect("flush");
        assert_eq!(second.attempted, 0);
        assert_eq!(second.delivered, 0);
        assert_eq!(channel.sent(), vec!["cmd-1".to_string()]);
    }

    #[test]
    fn flush_with_dead_channel_changes_nothing() {
        let queue = memory_queue();
        queue
            .enqueue("eos-1", "Rex", "cmd-1", "The Island", 30, 1)
            .expect("enqueue");
        let channel = ScriptedChannel::failing();
        let report = queue.flush(&channel).expect("flush");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn json_store_round_trips_across_reopen() {
        let path = temp_path("reopen");
        {
            let queue =
                PendingDeliveryQueue::open(Arc::new(JsonQueueStore::new(&path))).expect("open");
            queue
                .enqueue("eos-1", "Rex", "cmd-1", "The Island", 30, 1)
                .expect("enqueue");
        }
        let reopened =
            PendingDeliveryQueue::open(Arc::new(JsonQueueStore::new(&path))).expect("reopen");
        assert_eq!(reopened.pending_count(), 1);
        let id = reopened
            .enqueue("eos-2", "Argy", "cmd-2", "Ragnarok", 10, 2)
            .expect("enqueue");
        assert_eq!(id, 2);
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
