//! Canonical player identity directory.
//!
//! The ledger is keyed by the cross-platform EOS id, never by a chat
//! platform's own user id. This directory maps the platform aliases the
//! outside world speaks (discord id, steam id, xuid, pseudonym) to that
//! canonical id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ShopError;
use crate::util::read_json_from_path;

pub const IDENTITY_DIRECTORY_VERSION: u32 = 1;

fn default_identity_directory_version() -> u32 {
    IDENTITY_DIRECTORY_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub player_id: String,
    #[serde(default)]
    pub discord_id: Option<String>,
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub xuid: Option<String>,
    #[serde(default)]
    pub pseudo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDirectoryFile {
    #[serde(default = "default_identity_directory_version")]
    pub version: u32,
    pub records: Vec<IdentityRecord>,
}

pub struct IdentityDirectory {
    records: Vec<IdentityRecord>,
    by_discord: BTreeMap<String, String>,
    by_steam: BTreeMap<String, String>,
    by_xuid: BTreeMap<String, String>,
}

impl IdentityDirectory {
    pub fn from_records(records: Vec<IdentityRecord>) -> Self {
        let mut by_discord = BTreeMap::new();
        let mut by_steam = BTreeMap::new();
        let mut by_xuid = BTreeMap::new();
        for record in &records {
            if let Some(discord_id) = &record.discord_id {
                by_discord.insert(discord_id.clone(), record.player_id.clone());
            }
            if let Some(steam_id) = &record.steam_id {
                by_steam.insert(steam_id.clone(), record.player_id.clone());
            }
            if let Some(xuid) = &record.xuid {
                by_xuid.insert(xuid.clone(), record.player_id.clone());
            }
        }
        Self {
            records,
            by_discord,
            by_steam,
            by_xuid,
        }
    }

    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    /// Load from a JSON document; a missing file is an empty directory.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ShopError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::empty());
        }
        let file: IdentityDirectoryFile = read_json_from_path(path)?;
        if file.version != IDENTITY_DIRECTORY_VERSION {
            return Err(ShopError::Serde(format!(
                "unsupported identity directory version {} (expected {})",
                file.version, IDENTITY_DIRECTORY_VERSION
            )));
        }
        Ok(Self::from_records(file.records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every canonical player id, for population-wide sweeps.
    pub fn player_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| record.player_id.clone())
            .collect()
    }

    pub fn contains_player(&self, player_id: &str) -> bool {
        self.records
            .iter()
            .any(|record| record.player_id == player_id)
    }

    pub fn pseudo_for(&self, player_id: &str) -> Option<String> {
        self.records
            .iter()
            .find(|record| record.player_id == player_id)
            .and_then(|record| record.pseudo.clone())
    }

    pub fn resolve_discord(&self, discord_id: &str) -> Option<String> {
        self.by_discord.get(discord_id).cloned()
    }

    pub fn resolve_steam(&self, steam_id: &str) -> Option<String> {
        self.by_steam.get(steam_id).cloned()
    }

    pub fn resolve_xuid(&self, xuid: &str) -> Option<String> {
        self.by_xuid.get(xuid).cloned()
    }

    /// Pseudonyms are not unique by construction, so lookup distinguishes
    /// the nobody case from the more-than-one case.
    pub fn resolve_pseudo(&self, pseudo: &str) -> Result<String, ShopError> {
        let matches: Vec<&IdentityRecord> = self
            .records
            .iter()
            .filter(|record| record.pseudo.as_deref() == Some(pseudo))
            .collect();
        match matches.len() {
            0 => Err(ShopError::UnresolvedIdentity {
                identity: pseudo.to_string(),
            }),
            1 => Ok(matches[0].player_id.clone()),
            count => Err(ShopError::AmbiguousIdentity {
                pseudo: pseudo.to_string(),
                matches: count,
            }),
        }
    }
}
