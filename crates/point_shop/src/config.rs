//! Shop configuration, loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use point_shop_rcon::RconConfig;

use crate::error::ShopError;
use crate::messages::ShopMessages;
use crate::purchase::DEFAULT_SESSION_TTL_MS;
use crate::retry_limit::RetryLimiterConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5600";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REWARD_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_REWARD_POINTS: i64 = 10;

/// Maps a purchase may be delivered on.
pub const DEFAULT_CONTEXTS: &[&str] = &[
    "The Island",
    "Scorched Earth",
    "Aberration",
    "Extinction",
    "Genesis",
    "Genesis Part 2",
    "Ragnarok",
    "Valguero",
    "Crystal Isles",
    "Fjordur",
];

/// Periodic reward sweep policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub interval_minutes: u64,
    pub points: i64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_REWARD_INTERVAL_MINUTES,
            points: DEFAULT_REWARD_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseConfig {
    pub session_ttl_ms: i64,
    pub allowed_contexts: Vec<String>,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            allowed_contexts: DEFAULT_CONTEXTS.iter().map(|map| map.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    /// Token required for flush / retry-window-reset requests. Empty means
    /// administrative operations are refused until one is configured.
    pub admin_token: String,
    pub rcon: RconConfig,
    pub reward: RewardConfig,
    pub retry: RetryLimiterConfig,
    pub purchase: PurchaseConfig,
    pub messages: ShopMessages,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            admin_token: String::new(),
            rcon: RconConfig::default(),
            reward: RewardConfig::default(),
            retry: RetryLimiterConfig::default(),
            purchase: PurchaseConfig::default(),
            messages: ShopMessages::default(),
        }
    }
}

impl ShopConfig {
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ShopError> {
        let content = fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|err| ShopError::Serde(err.to_string()))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join("pending.json")
    }

    pub fn identities_path(&self) -> PathBuf {
        self.data_dir.join("identities.json")
    }
}
