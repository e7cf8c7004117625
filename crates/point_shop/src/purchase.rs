//! Interactive purchase sessions.
//!
//! A purchase is a short-lived state machine: the player picks an item
//! (`AwaitingContext`), then names the map they are on, which confirms the
//! purchase and resolves the command template. Sessions expire on their own
//! clock, and an expired session has committed nothing: no debit happens until
//! the `Confirmed` transition hands a [`ConfirmedPurchase`] to the shop.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::types::{SessionId, UnixMillis};

pub const DEFAULT_SESSION_TTL_MS: i64 = 30_000;

pub const IMPLANT_ID_PLACEHOLDER: &str = "{implantID}";
pub const MAP_PLACEHOLDER: &str = "{map}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseSessionState {
    AwaitingContext,
    Confirmed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSession {
    pub session_id: SessionId,
    pub player_id: String,
    pub item_name: String,
    pub price: i64,
    pub command_template: String,
    pub state: PurchaseSessionState,
    pub context: Option<String>,
    pub created_at_ms: UnixMillis,
    pub expires_at_ms: UnixMillis,
}

/// A confirmed purchase, ready for the debit-and-deliver pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedPurchase {
    pub session_id: SessionId,
    pub player_id: String,
    pub item_name: String,
    pub price: i64,
    pub context: String,
    pub resolved_command: String,
}

/// Substitute identity and context placeholders into a command template.
pub fn resolve_command(template: &str, player_id: &str, context: &str) -> String {
    template
        .replace(IMPLANT_ID_PLACEHOLDER, player_id)
        .replace(MAP_PLACEHOLDER, context)
}

#[derive(Debug)]
struct SessionsState {
    next_id: SessionId,
    sessions: BTreeMap<SessionId, PurchaseSession>,
}

pub struct PurchaseSessions {
    ttl_ms: i64,
    /// Contexts a session may confirm with; empty means any non-empty
    /// context is accepted.
    allowed_contexts: Vec<String>,
    state: Mutex<SessionsState>,
}

impl PurchaseSessions {
    pub fn new(ttl_ms: i64, allowed_contexts: Vec<String>) -> Self {
        Self {
            ttl_ms,
            allowed_contexts,
            state: Mutex::new(SessionsState {
                next_id: 1,
                sessions: BTreeMap::new(),
            }),
        }
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub fn begin(
        &self,
        player_id: &str,
        item_name: &str,
        price: i64,
        command_template: &str,
        now_ms: UnixMillis,
    ) -> Result<SessionId, ShopError> {
        if price <= 0 {
            return Err(ShopError::InvalidAmount { amount: price });
        }
        if command_template.trim().is_empty() {
            return Err(ShopError::EmptyCommand);
        }
        let mut state = self.state_guard()?;
        let session_id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        state.sessions.insert(
            session_id,
            PurchaseSession {
                session_id,
                player_id: player_id.to_string(),
                item_name: item_name.to_string(),
                price,
                command_template: command_template.to_string(),
                state: PurchaseSessionState::AwaitingContext,
                context: None,
                created_at_ms: now_ms,
                expires_at_ms: now_ms.saturating_add(self.ttl_ms),
            },
        );
        Ok(session_id)
    }

    /// `AwaitingContext → Confirmed`: attach the context, resolve the
    /// command and consume the session. An expired session transitions to
    /// `Expired` instead and reports it.
    pub fn confirm_context(
        &self,
        session_id: SessionId,
        context: &str,
        now_ms: UnixMillis,
    ) -> Result<ConfirmedPurchase, ShopError> {
        let context = context.trim();
        if context.is_empty() || !self.context_allowed(context) {
            return Err(ShopError::UnknownContext {
                context: context.to_string(),
            });
        }
        let mut state = self.state_guard()?;
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Err(ShopError::SessionNotFound { session_id });
        };
        if session.state != PurchaseSessionState::AwaitingContext {
            return Err(ShopError::SessionInvalidState {
                session_id,
                expected: "awaiting_context".to_string(),
                found: format!("{:?}", session.state),
            });
        }
        if now_ms >= session.expires_at_ms {
            session.state = PurchaseSessionState::Expired;
            state.sessions.remove(&session_id);
            return Err(ShopError::SessionExpired { session_id });
        }
        session.state = PurchaseSessionState::Confirmed;
        session.context = Some(context.to_string());
        let confirmed = ConfirmedPurchase {
            session_id,
            player_id: session.player_id.clone(),
            item_name: session.item_name.clone(),
            price: session.price,
            context: context.to_string(),
            resolved_command: resolve_command(
                &session.command_template,
                &session.player_id,
                context,
            ),
        };
        state.sessions.remove(&session_id);
        Ok(confirmed)
    }

    /// Sweep sessions past their deadline; returns the expired ids.
    pub fn expire_due(&self, now_ms: UnixMillis) -> Vec<SessionId> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let due: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|session| now_ms >= session.expires_at_ms)
            .map(|session| session.session_id)
            .collect();
        for session_id in &due {
            if let Some(session) = state.sessions.get_mut(session_id) {
                session.state = PurchaseSessionState::Expired;
            }
            state.sessions.remove(session_id);
        }
        due
    }

    pub fn session(&self, session_id: SessionId) -> Option<PurchaseSession> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.sessions.get(&session_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.sessions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn context_allowed(&self, context: &str) -> bool {
        self.allowed_contexts.is_empty()
            || self.allowed_contexts.iter().any(|allowed| allowed == context)
    }

    fn state_guard(&self) -> Result<MutexGuard<'_, SessionsState>, ShopError> {
        self.state.lock().map_err(|_| ShopError::LockPoisoned {
            what: "purchase sessions".to_string(),
        })
    }
}
