//! Externally-sourced credit intake.
//!
//! Webhook payloads name the player through whichever identity field the
//! payment service happens to carry; the first non-empty one wins, in the
//! order `eos_id`, `player_id`, `pseudo`, `xuid`, `steam_id`. Validation
//! rejects the payload before any ledger effect.

use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::identity::IdentityDirectory;
use crate::types::TransactionId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPayload {
    #[serde(default)]
    pub eos_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub pseudo: Option<String>,
    #[serde(default)]
    pub xuid: Option<String>,
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub points: i64,
}

impl CreditPayload {
    /// The identity the payload names, resolution aside. Used as the
    /// limiter subject so retry budgets survive resolution failures.
    pub fn subject_id(&self) -> String {
        non_empty(&self.eos_id)
            .or_else(|| non_empty(&self.player_id))
            .or_else(|| non_empty(&self.pseudo))
            .or_else(|| non_empty(&self.xuid))
            .or_else(|| non_empty(&self.steam_id))
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Resolve to the canonical player id, first non-empty field wins.
    ///
    /// `eos_id` and `player_id` are already canonical and pass through;
    /// the platform aliases must resolve via the directory.
    pub fn resolve_player_id(&self, directory: &IdentityDirectory) -> Result<String, ShopError> {
        if let Some(eos_id) = non_empty(&self.eos_id) {
            return Ok(eos_id.to_string());
        }
        if let Some(player_id) = non_empty(&self.player_id) {
            return Ok(player_id.to_string());
        }
        if let Some(pseudo) = non_empty(&self.pseudo) {
            return directory.resolve_pseudo(pseudo);
        }
        if let Some(xuid) = non_empty(&self.xuid) {
            return directory
                .resolve_xuid(xuid)
                .ok_or_else(|| ShopError::UnresolvedIdentity {
                    identity: xuid.to_string(),
                });
        }
        if let Some(steam_id) = non_empty(&self.steam_id) {
            return directory
                .resolve_steam(steam_id)
                .ok_or_else(|| ShopError::UnresolvedIdentity {
                    identity: steam_id.to_string(),
                });
        }
        Err(ShopError::InvalidCreditPayload {
            reason: "no identity field present".to_string(),
        })
    }

    /// Positive integer points or the payload is rejected outright.
    pub fn validate_points(&self) -> Result<i64, ShopError> {
        if self.points <= 0 {
            return Err(ShopError::InvalidCreditPayload {
                reason: format!("points must be positive, got {}", self.points),
            });
        }
        Ok(self.points)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Receipt for a committed external credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditReceipt {
    pub player_id: String,
    pub transaction_id: TransactionId,
    pub points: i64,
    pub new_balance: i64,
}
