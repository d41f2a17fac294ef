//! Session configuration: a JSON file under the user's config directory,
//! overridable through `G1835__*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{catalog::Catalog, entity::PlayerId};

const CONFIG_DIR: &str = "g1835";
const CONFIG_FILE: &str = "config.json";
const ENV_PREFIX: &str = "G1835";

/// Settings for one game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Player names in seating order.
    pub players: Vec<String>,
    /// Cash the bank starts with.
    pub bank_cash: i64,
    /// Overrides the per-player-count starting cash table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_cash: Option<i64>,
    /// Draft seats players from the last seat to the first.
    pub reverse_draft_order: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            players: ["Player 1", "Player 2", "Player 3"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            bank_cash: 12_000,
            starting_cash: None,
            reverse_draft_order: true,
        }
    }
}

impl GameConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from `path` (which may be missing) plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("players"),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration in {}", path.display()))?;
        info!(path = %path.display(), players = config.players.len(), "configuration loaded");
        Ok(config)
    }

    /// Reject settings the catalog cannot seat.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        let count = self.players.len();
        ensure!(
            catalog.meta.supports(count),
            "{} supports {}-{} players, got {count}",
            catalog.meta.display_name(),
            catalog.meta.min_players,
            catalog.meta.max_players
        );
        for (index, name) in self.players.iter().enumerate() {
            if name.trim().is_empty() {
                bail!("player {} has an empty name", index + 1);
            }
            if self.players[..index].contains(name) {
                bail!("player name '{name}' is used twice");
            }
        }
        ensure!(self.bank_cash > 0, "bank cash must be positive, got {}", self.bank_cash);
        if let Some(cash) = self.starting_cash {
            ensure!(cash >= 0, "starting cash cannot be negative, got {cash}");
        }
        Ok(())
    }

    /// Starting cash per player: the override, or the catalog's table.
    pub fn starting_cash_for(&self, catalog: &Catalog) -> Result<i64> {
        match self.starting_cash {
            Some(cash) => Ok(cash),
            None => catalog
                .starting_cash_for(self.players.len())
                .with_context(|| format!("no starting cash defined for {} players", self.players.len())),
        }
    }

    /// Seats in the order they act during the draft.
    pub fn draft_order(&self) -> Vec<PlayerId> {
        let seats = (0..self.players.len()).map(PlayerId);
        if self.reverse_draft_order {
            seats.rev().collect()
        } else {
            seats.collect()
        }
    }
}

/// `~/.config/g1835/config.json`, or relative to the working directory when
/// no config directory is known.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write the default configuration unless a file already exists.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = default_config_path();
    ensure_default_config_at(&path)?;
    Ok(path)
}

/// Write the default configuration to `path` unless it already exists.
pub fn ensure_default_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let serialised = serde_json::to_vec_pretty(&GameConfig::default())?;
    fs::write(path, serialised).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "default configuration written");
    Ok(())
}
