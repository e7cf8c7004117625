//! The shop core: one owner for the ledger, queue, executor, limiter,
//! identity directory and purchase sessions, wired once at startup and
//! shared behind `Arc` by every front end.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use point_shop_rcon::CommandChannel;

use crate::config::ShopConfig;
use crate::credit::{CreditPayload, CreditReceipt};
use crate::delivery::{DeliveryExecutor, DeliveryOutcome};
use crate::error::ShopError;
use crate::identity::IdentityDirectory;
use crate::ledger::{JsonLedgerStore, Ledger, LedgerAuditReport, LedgerReceipt};
use crate::messages::ShopMessages;
use crate::pending::{FlushReport, JsonQueueStore, PendingDeliveryQueue};
use crate::purchase::{ConfirmedPurchase, PurchaseSessions};
use crate::retry_limit::{RetryDecision, RetryRateLimiter};
use crate::types::{PendingDeliveryId, SessionId, TransactionId, TransactionStatus, UnixMillis};

/// Receipt for a completed (delivered or queued) purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub session_id: SessionId,
    pub player_id: String,
    pub item_name: String,
    pub price: i64,
    pub context: String,
    pub outcome: DeliveryOutcome,
    pub transaction_id: TransactionId,
    pub new_balance: i64,
    pub pending_delivery_id: Option<PendingDeliveryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub from_player_id: String,
    pub to_player_id: String,
    pub amount: i64,
    pub from_balance: i64,
    pub to_balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardSweepReport {
    pub credited: usize,
    pub failed: usize,
}

pub struct PointShop {
    ledger: Ledger,
    queue: PendingDeliveryQueue,
    executor: DeliveryExecutor,
    limiter: RetryRateLimiter,
    directory: IdentityDirectory,
    sessions: PurchaseSessions,
    messages: ShopMessages,
}

impl PointShop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Ledger,
        queue: PendingDeliveryQueue,
        executor: DeliveryExecutor,
        limiter: RetryRateLimiter,
        directory: IdentityDirectory,
        sessions: PurchaseSessions,
        messages: ShopMessages,
    ) -> Self {
        Self {
            ledger,
            queue,
            executor,
            limiter,
            directory,
            sessions,
            messages,
        }
    }

    /// Wire the shop from config-addressed JSON stores and a channel.
    pub fn open(config: &ShopConfig, channel: Arc<dyn CommandChannel>) -> Result<Self, ShopError> {
        let ledger = Ledger::open(Arc::new(JsonLedgerStore::new(config.ledger_path())))?;
        let queue = PendingDeliveryQueue::open(Arc::new(JsonQueueStore::new(config.pending_path())))?;
        let directory = IdentityDirectory::load_json(config.identities_path())?;
        Ok(Self::new(
            ledger,
            queue,
            DeliveryExecutor::new(channel),
            RetryRateLimiter::new(config.retry),
            directory,
            PurchaseSessions::new(
                config.purchase.session_ttl_ms,
                config.purchase.allowed_contexts.clone(),
            ),
            config.messages.clone(),
        ))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn queue(&self) -> &PendingDeliveryQueue {
        &self.queue
    }

    pub fn limiter(&self) -> &RetryRateLimiter {
        &self.limiter
    }

    pub fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    pub fn sessions(&self) -> &PurchaseSessions {
        &self.sessions
    }

    pub fn balance(&self, player_id: &str) -> i64 {
        self.ledger.balance(player_id)
    }

    /// Balance query with the in-game chat echo the players expect.
    pub fn announce_balance(&self, player_id: &str) -> i64 {
        let points = self.ledger.balance(player_id);
        self.notify_player(player_id, &self.messages.have_points(points));
        points
    }

    pub fn audit(&self) -> Result<LedgerAuditReport, ShopError> {
        self.ledger.audit()
    }

    // ------------------------------------------------------------------
    // Rewards
    // ------------------------------------------------------------------

    pub fn grant_interval_reward(
        &self,
        player_id: &str,
        points: i64,
        now_ms: UnixMillis,
    ) -> Result<LedgerReceipt, ShopError> {
        if points <= 0 {
            return Err(ShopError::InvalidAmount { amount: points });
        }
        let receipt = self.ledger.record_transaction(
            player_id,
            points,
            TransactionStatus::IntervalReward,
            "interval_reward",
            now_ms,
        )?;
        self.notify_player(
            player_id,
            &self.messages.received_points(points, receipt.new_balance),
        );
        Ok(receipt)
    }

    /// Credit every linked player; chat feedback is best-effort.
    pub fn reward_sweep(&self, points: i64, now_ms: UnixMillis) -> RewardSweepReport {
        let mut report = RewardSweepReport::default();
        for player_id in self.directory.player_ids() {
            match self.grant_interval_reward(&player_id, points, now_ms) {
                Ok(_) => report.credited += 1,
                Err(err) => {
                    report.failed += 1;
                    eprintln!("reward sweep: credit {player_id} failed: {err:?}");
                }
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn trade(
        &self,
        from_player_id: &str,
        to: &str,
        amount: i64,
        now_ms: UnixMillis,
    ) -> Result<TradeReceipt, ShopError> {
        if amount <= 0 {
            return Err(ShopError::InvalidAmount { amount });
        }
        let to_player_id = self.resolve_trade_target(to)?;
        if to_player_id == from_player_id {
            return Err(ShopError::SelfTrade {
                player_id: from_player_id.to_string(),
            });
        }
        let to_name = self
            .directory
            .pseudo_for(&to_player_id)
            .unwrap_or_else(|| to_player_id.clone());
        let from_name = self
            .directory
            .pseudo_for(from_player_id)
            .unwrap_or_else(|| from_player_id.to_string());

        let debit = self.ledger.debit(
            from_player_id,
            amount,
            TransactionStatus::TradeSent,
            &format!("to:{to_name}"),
            now_ms,
        )?;
        let credit = self.ledger.record_transaction(
            &to_player_id,
            amount,
            TransactionStatus::TradeReceived,
            &format!("from:{from_name}"),
            now_ms,
        )?;

        self.notify_player(from_player_id, &self.messages.sent_points(amount, &to_name));
        self.notify_player(&to_player_id, &self.messages.got_points(amount, &from_name));

        Ok(TradeReceipt {
            from_player_id: from_player_id.to_string(),
            to_player_id,
            amount,
            from_balance: debit.new_balance,
            to_balance: credit.new_balance,
        })
    }

    /// A trade target is either a canonical player id or a pseudonym.
    fn resolve_trade_target(&self, to: &str) -> Result<String, ShopError> {
        if self.directory.contains_player(to) {
            return Ok(to.to_string());
        }
        self.directory.resolve_pseudo(to)
    }

    // ------------------------------------------------------------------
    // Purchases
    // ------------------------------------------------------------------

    pub fn begin_purchase(
        &self,
        player_id: &str,
        item_name: &str,
        price: i64,
        command_template: &str,
        now_ms: UnixMillis,
    ) -> Result<SessionId, ShopError> {
        self.sessions
            .begin(player_id, item_name, price, command_template, now_ms)
    }

    pub fn confirm_purchase(
        &self,
        session_id: SessionId,
        context: &str,
        now_ms: UnixMillis,
    ) -> Result<PurchaseReceipt, ShopError> {
        let confirmed = self.sessions.confirm_context(session_id, context, now_ms)?;
        self.execute_purchase(confirmed, now_ms)
    }

    /// Debit and deliver a confirmed purchase.
    ///
    /// The balance check, the single delivery attempt and the status-tagged
    /// append commit as one unit under the player's debit guard; the
    /// ledger-wide lock is never held across the channel call. A transport
    /// failure leaves the debit standing and parks exactly one pending
    /// record, queued after the transaction so the queue never holds an
    /// un-debited purchase.
    fn execute_purchase(
        &self,
        confirmed: ConfirmedPurchase,
        now_ms: UnixMillis,
    ) -> Result<PurchaseReceipt, ShopError> {
        let source = format!("buy:{}:{}", confirmed.item_name, confirmed.context);
        let receipt = self.ledger.debit_with_attempt(
            &confirmed.player_id,
            confirmed.price,
            &source,
            now_ms,
            || match self.executor.attempt(&confirmed.resolved_command) {
                DeliveryOutcome::Delivered => TransactionStatus::Success,
                DeliveryOutcome::Queued => TransactionStatus::Queued,
            },
        )?;
        let outcome = match receipt.status {
            TransactionStatus::Success => DeliveryOutcome::Delivered,
            _ => DeliveryOutcome::Queued,
        };
        let pending_delivery_id = if outcome == DeliveryOutcome::Queued {
            Some(self.queue.enqueue(
                &confirmed.player_id,
                &confirmed.item_name,
                &confirmed.resolved_command,
                &confirmed.context,
                confirmed.price,
                now_ms,
            )?)
        } else {
            None
        };
        Ok(PurchaseReceipt {
            session_id: confirmed.session_id,
            player_id: confirmed.player_id,
            item_name: confirmed.item_name,
            price: confirmed.price,
            context: confirmed.context,
            outcome,
            transaction_id: receipt.transaction_id,
            new_balance: receipt.new_balance,
            pending_delivery_id,
        })
    }

    pub fn expire_sessions(&self, now_ms: UnixMillis) -> Vec<SessionId> {
        self.sessions.expire_due(now_ms)
    }

    // ------------------------------------------------------------------
    // Pending deliveries
    // ------------------------------------------------------------------

    pub fn flush_pending(&self) -> Result<FlushReport, ShopError> {
        self.queue.flush(self.executor.channel())
    }

    // ------------------------------------------------------------------
    // External credits
    // ------------------------------------------------------------------

    pub fn credit(
        &self,
        payload: &CreditPayload,
        now_ms: UnixMillis,
    ) -> Result<CreditReceipt, ShopError> {
        self.apply_credit(payload, TransactionStatus::Tip4Serv, "tip4serv", now_ms)
    }

    /// Human-triggered replay of a failed credit, gated by the limiter.
    pub fn retry_credit(
        &self,
        actor_id: &str,
        payload: &CreditPayload,
        now_ms: UnixMillis,
    ) -> Result<CreditReceipt, ShopError> {
        let subject_id = payload.subject_id();
        match self.limiter.attempt(actor_id, &subject_id, now_ms)? {
            RetryDecision::Denied { .. } => Err(ShopError::RetryLimitExceeded {
                actor_id: actor_id.to_string(),
                subject_id,
            }),
            RetryDecision::Allowed { .. } => self.apply_credit(
                payload,
                TransactionStatus::ManualRetry,
                &format!("manual_retry:{actor_id}"),
                now_ms,
            ),
        }
    }

    pub fn reset_retry_window(&self, actor_id: &str, subject_id: &str) -> Result<(), ShopError> {
        self.limiter.reset(actor_id, subject_id)
    }

    fn apply_credit(
        &self,
        payload: &CreditPayload,
        status: TransactionStatus,
        source: &str,
        now_ms: UnixMillis,
    ) -> Result<CreditReceipt, ShopError> {
        let points = payload.validate_points()?;
        let player_id = payload.resolve_player_id(&self.directory)?;
        let receipt = self
            .ledger
            .record_transaction(&player_id, points, status, source, now_ms)?;
        self.notify_player(
            &player_id,
            &self.messages.received_points(points, receipt.new_balance),
        );
        Ok(CreditReceipt {
            player_id,
            transaction_id: receipt.transaction_id,
            points,
            new_balance: receipt.new_balance,
        })
    }

    /// Best-effort in-game chat line; only players with a known pseudonym
    /// can be addressed.
    fn notify_player(&self, player_id: &str, text: &str) -> bool {
        let Some(pseudo) = self.directory.pseudo_for(player_id) else {
            return false;
        };
        self.executor
            .notify(&self.messages.chat_command(&pseudo, text))
    }
}
