//! Sliding-window limiter for manual credit recovery attempts.
//!
//! State is ephemeral and process-lifetime: windows are keyed by
//! `(actor, subject)`, pruned lazily on each attempt, cleared wholesale by
//! an administrative reset, and garbage-collected once every timestamp in a
//! key has aged out.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::types::UnixMillis;

pub const DEFAULT_RETRY_CAP: u32 = 2;
pub const DEFAULT_RETRY_WINDOW_MS: i64 = 3 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryLimiterConfig {
    pub cap: u32,
    pub window_ms: i64,
}

impl Default for RetryLimiterConfig {
    fn default() -> Self {
        Self {
            cap: DEFAULT_RETRY_CAP,
            window_ms: DEFAULT_RETRY_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Allowed { used: u32, cap: u32 },
    /// Denied; the oldest in-window attempt expires at `retry_at_ms`.
    Denied { retry_at_ms: UnixMillis },
}

impl RetryDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RetryDecision::Allowed { .. })
    }
}

pub struct RetryRateLimiter {
    config: RetryLimiterConfig,
    windows: Mutex<BTreeMap<(String, String), Vec<UnixMillis>>>,
}

impl RetryRateLimiter {
    pub fn new(config: RetryLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &RetryLimiterConfig {
        &self.config
    }

    /// Count in-window attempts for `(actor, subject)`; under the cap the
    /// attempt is recorded and allowed, otherwise denied with no state
    /// change beyond pruning expired timestamps.
    pub fn attempt(
        &self,
        actor_id: &str,
        subject_id: &str,
        now_ms: UnixMillis,
    ) -> Result<RetryDecision, ShopError> {
        let cutoff = now_ms.saturating_sub(self.config.window_ms);
        let mut windows = self.windows_guard()?;
        let entry = windows
            .entry((actor_id.to_string(), subject_id.to_string()))
            .or_default();
        entry.retain(|timestamp| *timestamp >= cutoff);
        if (entry.len() as u32) < self.config.cap {
            entry.push(now_ms);
            return Ok(RetryDecision::Allowed {
                used: entry.len() as u32,
                cap: self.config.cap,
            });
        }
        let oldest = entry.first().copied().unwrap_or(now_ms);
        Ok(RetryDecision::Denied {
            retry_at_ms: oldest.saturating_add(self.config.window_ms),
        })
    }

    /// Clear the window for one `(actor, subject)` key, restoring the full
    /// retry budget. The role check belongs to the caller.
    pub fn reset(&self, actor_id: &str, subject_id: &str) -> Result<(), ShopError> {
        let mut windows = self.windows_guard()?;
        windows.remove(&(actor_id.to_string(), subject_id.to_string()));
        Ok(())
    }

    /// Drop every key whose timestamps have all aged out; returns how many
    /// keys were collected.
    pub fn gc(&self, now_ms: UnixMillis) -> Result<usize, ShopError> {
        let cutoff = now_ms.saturating_sub(self.config.window_ms);
        let mut windows = self.windows_guard()?;
        let before = windows.len();
        windows.retain(|_, timestamps| timestamps.iter().any(|timestamp| *timestamp >= cutoff));
        Ok(before - windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|windows| windows.len()).unwrap_or(0)
    }

    fn windows_guard(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<(String, String), Vec<UnixMillis>>>, ShopError> {
        self.windows.lock().map_err(|_| ShopError::LockPoisoned {
            what: "retry limiter windows".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn limiter() -> RetryRateLimiter {
        RetryRateLimiter::new(RetryLimiterConfig::default())
    }

    #[test]
    fn allows_cap_attempts_then_denies() {
        let limiter = limiter();
        assert!(limiter.attempt("admin", "eos-1", 0).expect("attempt").is_allowed());
        assert!(limiter.attempt("admin", "eos-1", 1).expect("attempt").is_allowed());
        let third = limiter.attempt("admin", "eos-1", 2).expect("attempt");
        assert_eq!(third, RetryDecision::Denied {
            retry_at_ms: DEFAULT_RETRY_WINDOW_MS,
        });
        // Denial records nothing: the budget frees exactly when the oldest
        // allowed attempt leaves the window.
        let after_expiry = limiter
            .attempt("admin", "eos-1", DEFAULT_RETRY_WINDOW_MS + 1)
            .expect("attempt");
        assert_eq!(after_expiry, RetryDecision::Allowed { used: 2, cap: 2 });
    }

    #[test]
    fn windows_are_keyed_per_actor_subject_pair() {
        let limiter = limiter();
        limiter.attempt("admin", "eos-1", 0).expect("attempt");
        limiter.attempt("admin", "eos-1", 0).expect("attempt");
        assert!(limiter.attempt("admin", "eos-2", 0).expect("attempt").is_allowed());
        assert!(limiter.attempt("other", "eos-1", 0).expect("attempt").is_allowed());
        assert!(!limiter.attempt("admin", "eos-1", 0).expect("attempt").is_allowed());
    }

    #[test]
    fn stale_timestamps_do_not_count() {
        let limiter = limiter();
        limiter.attempt("admin", "eos-1", 0).expect("attempt");
        limiter.attempt("admin", "eos-1", HOUR_MS).expect("attempt");
        // Four hours in, only the one-hour-old attempt is still in window.
        let decision = limiter.attempt("admin", "eos-1", 4 * HOUR_MS).expect("attempt");
        assert_eq!(decision, RetryDecision::Allowed { used: 2, cap: 2 });
    }

    #[test]
    fn reset_restores_the_full_budget() {
        let limiter = limiter();
        limiter.attempt("admin", "eos-1", 0).expect("attempt");
        limiter.attempt("admin", "eos-1", 0).expect("attempt");
        assert!(!limiter.attempt("admin", "eos-1", 1).expect("attempt").is_allowed());
        limiter.reset("admin", "eos-1").expect("reset");
        assert_eq!(
            limiter.attempt("admin", "eos-1", 2).expect("attempt"),
            RetryDecision::Allowed { used: 1, cap: 2 }
        );
    }

    #[test]
    fn gc_drops_fully_expired_keys_only() {
        let limiter = limiter();
        limiter.attempt("admin", "eos-old", 0).expect("attempt");
        limiter.attempt("admin", "eos-new", 4 * HOUR_MS).expect("attempt");
        assert_eq!(limiter.tracked_keys(), 2);
        let collected = limiter.gc(4 * HOUR_MS).expect("gc");
        assert_eq!(collected, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
