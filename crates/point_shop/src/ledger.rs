//! Append-only points ledger with derived balances.
//!
//! The log of signed deltas is the source of truth; per-player balances are
//! a cache maintained under the same lock that guards appends and verified
//! against full replay by [`Ledger::audit`]. Debits serialize per player so
//! a check-then-append can never overdraw, while operations on unrelated
//! players proceed concurrently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::types::{TransactionId, TransactionStatus, UnixMillis};
use crate::util::{hash_json, read_json_from_path, write_json_to_path};

pub const LEDGER_LOG_VERSION: u32 = 1;

fn default_ledger_log_version() -> u32 {
    LEDGER_LOG_VERSION
}

/// One immutable signed point movement. Never mutated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub player_id: String,
    /// Signed point movement; persisted as `points`.
    #[serde(rename = "points")]
    pub delta: i64,
    pub status: TransactionStatus,
    pub source: String,
    pub timestamp_ms: UnixMillis,
}

/// The durable form of the ledger: a versioned transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLog {
    #[serde(default = "default_ledger_log_version")]
    pub version: u32,
    pub transactions: Vec<Transaction>,
}

impl LedgerLog {
    pub fn new() -> Self {
        Self {
            version: LEDGER_LOG_VERSION,
            transactions: Vec::new(),
        }
    }

    pub(crate) fn validate_version(&self) -> Result<(), ShopError> {
        if self.version == LEDGER_LOG_VERSION {
            Ok(())
        } else {
            Err(ShopError::Serde(format!(
                "unsupported ledger log version {} (expected {})",
                self.version, LEDGER_LOG_VERSION
            )))
        }
    }
}

impl Default for LedgerLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage seam for the transaction log.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<LedgerLog, ShopError>;
    fn save(&self, log: &LedgerLog) -> Result<(), ShopError>;
}

/// JSON file store; a missing file is an empty ledger.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> Result<LedgerLog, ShopError> {
        if !self.path.exists() {
            return Ok(LedgerLog::new());
        }
        let log: LedgerLog = read_json_from_path(&self.path)?;
        log.validate_version()?;
        Ok(log)
    }

    fn save(&self, log: &LedgerLog) -> Result<(), ShopError> {
        write_json_to_path(log, &self.path)
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    log: Mutex<LedgerLog>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<LedgerLog, ShopError> {
        self.log
            .lock()
            .map(|log| log.clone())
            .map_err(|_| ShopError::LockPoisoned {
                what: "memory ledger store".to_string(),
            })
    }

    fn save(&self, log: &LedgerLog) -> Result<(), ShopError> {
        let mut slot = self.log.lock().map_err(|_| ShopError::LockPoisoned {
            what: "memory ledger store".to_string(),
        })?;
        *slot = log.clone();
        Ok(())
    }
}

/// Receipt for a committed ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub new_balance: i64,
}

#[derive(Debug)]
struct LedgerState {
    next_id: TransactionId,
    log: LedgerLog,
    balances: BTreeMap<String, i64>,
}

/// Per-player cache/replay mismatch found by an audit pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAuditViolation {
    pub player_id: String,
    pub cached: i64,
    pub replayed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAuditReport {
    pub transaction_count: usize,
    pub player_count: usize,
    pub log_checksum: String,
    pub violations: Vec<LedgerAuditViolation>,
}

impl LedgerAuditReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    state: Mutex<LedgerState>,
    debit_guards: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl Ledger {
    pub fn open(store: Arc<dyn LedgerStore>) -> Result<Self, ShopError> {
        let log = store.load()?;
        let mut balances = BTreeMap::new();
        let mut next_id = 1;
        for transaction in &log.transactions {
            *balances.entry(transaction.player_id.clone()).or_insert(0) += transaction.delta;
            next_id = next_id.max(transaction.id.saturating_add(1));
        }
        Ok(Self {
            store,
            state: Mutex::new(LedgerState {
                next_id,
                log,
                balances,
            }),
            debit_guards: Mutex::new(BTreeMap::new()),
        })
    }

    /// Current balance; 0 for a player with no transactions.
    pub fn balance(&self, player_id: &str) -> i64 {
        self.state
            .lock()
            .map(|state| state.balances.get(player_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Balance recomputed by full replay of the log (the audit path).
    pub fn replayed_balance(&self, player_id: &str) -> i64 {
        self.state
            .lock()
            .map(|state| {
                state
                    .log
                    .transactions
                    .iter()
                    .filter(|transaction| transaction.player_id == player_id)
                    .map(|transaction| transaction.delta)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn transactions_for(&self, player_id: &str) -> Vec<Transaction> {
        self.state
            .lock()
            .map(|state| {
                state
                    .log
                    .transactions
                    .iter()
                    .filter(|transaction| transaction.player_id == player_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn transaction_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.log.transactions.len())
            .unwrap_or(0)
    }

    /// Append a transaction and return the updated derived balance.
    ///
    /// Credits (`delta > 0`) always succeed. Zero deltas are rejected.
    /// Negative deltas route through [`Ledger::debit`] so the non-negative
    /// balance invariant holds on every path.
    pub fn record_transaction(
        &self,
        player_id: &str,
        delta: i64,
        status: TransactionStatus,
        source: &str,
        now_ms: UnixMillis,
    ) -> Result<LedgerReceipt, ShopError> {
        if delta == 0 {
            return Err(ShopError::InvalidAmount { amount: 0 });
        }
        if delta < 0 {
            return self.debit(player_id, delta.saturating_neg(), status, source, now_ms);
        }
        let mut state = self.state_guard()?;
        self.append_locked(&mut state, player_id, delta, status, source, now_ms)
    }

    /// Atomic check-then-append debit.
    pub fn debit(
        &self,
        player_id: &str,
        amount: i64,
        status: TransactionStatus,
        source: &str,
        now_ms: UnixMillis,
    ) -> Result<LedgerReceipt, ShopError> {
        self.debit_with_attempt(player_id, amount, source, now_ms, || status)
    }

    /// Debit whose status tag is decided by `attempt`, run after the balance
    /// check passes and before the append commits.
    ///
    /// Only this player's debit guard is held across `attempt`; the
    /// ledger-wide state lock is not, so a slow delivery call never blocks
    /// other players. Concurrent credits to the same player are safe: the
    /// balance can only grow between check and append.
    pub fn debit_with_attempt<F>(
        &self,
        player_id: &str,
        amount: i64,
        source: &str,
        now_ms: UnixMillis,
        attempt: F,
    ) -> Result<LedgerReceipt, ShopError>
    where
        F: FnOnce() -> TransactionStatus,
    {
        if amount <= 0 {
            return Err(ShopError::InvalidAmount { amount });
        }
        let guard = self.debit_guard(player_id)?;
        let _held = guard.lock().map_err(|_| ShopError::LockPoisoned {
            what: format!("debit guard for {player_id}"),
        })?;
        let balance = {
            let state = self.state_guard()?;
            state.balances.get(player_id).copied().unwrap_or(0)
        };
        if balance < amount {
            return Err(ShopError::InsufficientBalance {
                player_id: player_id.to_string(),
                balance,
                requested: amount,
            });
        }
        let status = attempt();
        let mut state = self.state_guard()?;
        self.append_locked(&mut state, player_id, -amount, status, source, now_ms)
    }

    /// Verify the balance cache against full replay and checksum the log.
    pub fn audit(&self) -> Result<LedgerAuditReport, ShopError> {
        let state = self.state_guard()?;
        let mut replayed: BTreeMap<String, i64> = BTreeMap::new();
        for transaction in &state.log.transactions {
            *replayed.entry(transaction.player_id.clone()).or_insert(0) += transaction.delta;
        }
        let mut violations = Vec::new();
        for (player_id, replayed_balance) in &replayed {
            let cached = state.balances.get(player_id).copied().unwrap_or(0);
            if cached != *replayed_balance {
                violations.push(LedgerAuditViolation {
                    player_id: player_id.clone(),
                    cached,
                    replayed: *replayed_balance,
                });
            }
        }
        Ok(LedgerAuditReport {
            transaction_count: state.log.transactions.len(),
            player_count: replayed.len(),
            log_checksum: hash_json(&state.log)?,
            violations,
        })
    }

    fn state_guard(&self) -> Result<MutexGuard<'_, LedgerState>, ShopError> {
        self.state.lock().map_err(|_| ShopError::LockPoisoned {
            what: "ledger state".to_string(),
        })
    }

    fn debit_guard(&self, player_id: &str) -> Result<Arc<Mutex<()>>, ShopError> {
        let mut guards = self.debit_guards.lock().map_err(|_| ShopError::LockPoisoned {
            what: "ledger debit guards".to_string(),
        })?;
        Ok(guards
            .entry(player_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn append_locked(
        &self,
        state: &mut LedgerState,
        player_id: &str,
        delta: i64,
        status: TransactionStatus,
        source: &str,
        now_ms: UnixMillis,
    ) -> Result<LedgerReceipt, ShopError> {
        let transaction = Transaction {
            id: state.next_id,
            player_id: player_id.to_string(),
            delta,
            status,
            source: source.to_string(),
            timestamp_ms: now_ms,
        };
        state.log.transactions.push(transaction);
        if let Err(err) = self.store.save(&state.log) {
            state.log.transactions.pop();
            return Err(err);
        }
        let balance = state.balances.entry(player_id.to_string()).or_insert(0);
        *balance += delta;
        let receipt = LedgerReceipt {
            transaction_id: state.next_id,
            status,
            new_balance: *balance,
        };
        state.next_id = state.next_id.saturating_add(1);
        Ok(receipt)
    }
}
