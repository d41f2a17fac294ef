#![allow(missing_docs)]

//! Draft items, corporations and the registry tracking their ownership.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::{GameError, GameResult},
    grid::GridPosition,
    shares::ShareSlot,
};

/// Seat index of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub usize);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity key of a company, minor or corporation (`NF`, `P2`, `PR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for EntityKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Anything that can hold cash, certificates or trains in the ledger.
///
/// `Bank` doubles as the IPO for certificates and the depot for trains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Holder {
    Bank,
    Player(PlayerId),
    Entity(EntityKey),
}

impl Holder {
    pub fn entity(key: &EntityKey) -> Self {
        Self::Entity(key.clone())
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Bank => f.write_str("bank"),
            Holder::Player(id) => write!(f, "player {id}"),
            Holder::Entity(key) => write!(f, "{key}"),
        }
    }
}

/// Private company sold at a flat price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateCompany {
    pub sym: EntityKey,
    pub name: String,
    pub value: i64,
    pub revenue: i64,
    /// Certificate handed to the buyer together with the company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_share: Option<ShareSlot>,
}

/// Minor railway sold at a flat price; floats on purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinorCorporation {
    pub sym: EntityKey,
    pub name: String,
    pub value: i64,
    /// Hex holding the minor's home token.
    pub home: String,
}

/// Director's certificate of a major corporation offered in the draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MajorCorporation {
    pub sym: EntityKey,
    pub name: String,
    pub par_price: i64,
    pub director_percent: u32,
}

/// The closed set of things a player can acquire in the draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftKind {
    Private(PrivateCompany),
    Minor(MinorCorporation),
    Major(MajorCorporation),
}

/// One entry of the start packet together with its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftItem {
    pub kind: DraftKind,
    pub position: GridPosition,
    #[serde(default)]
    owner: Option<PlayerId>,
    #[serde(default)]
    closed: bool,
}

impl DraftItem {
    pub fn new(kind: DraftKind, position: GridPosition) -> Self {
        Self {
            kind,
            position,
            owner: None,
            closed: false,
        }
    }

    pub fn key(&self) -> &EntityKey {
        match &self.kind {
            DraftKind::Private(company) => &company.sym,
            DraftKind::Minor(minor) => &minor.sym,
            DraftKind::Major(major) => &major.sym,
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            DraftKind::Private(company) => &company.name,
            DraftKind::Minor(minor) => &minor.name,
            DraftKind::Major(major) => &major.name,
        }
    }

    /// Lowest acceptable price in the draft.
    pub fn min_bid(&self) -> i64 {
        match &self.kind {
            DraftKind::Private(company) => company.value,
            DraftKind::Minor(minor) => minor.value,
            DraftKind::Major(major) => major.par_price * i64::from(major.director_percent) / 100,
        }
    }

    /// Location of the home token, for entities that place one.
    pub fn home(&self) -> Option<&str> {
        match &self.kind {
            DraftKind::Minor(minor) => Some(minor.home.as_str()),
            DraftKind::Private(_) | DraftKind::Major(_) => None,
        }
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record the buyer. Ownership is set exactly once.
    pub fn assign_owner(&mut self, player: PlayerId) -> GameResult<()> {
        if let Some(existing) = self.owner {
            return Err(GameError::consistency(format!(
                "{} is already owned by player {existing}",
                self.key()
            )));
        }
        self.owner = Some(player);
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

/// Share-issuing corporation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corporation {
    pub sym: EntityKey,
    pub name: String,
    /// Certificate percentages; index 0 is the director's certificate.
    pub shares: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default)]
    pub floated: bool,
}

impl Corporation {
    pub fn new(sym: impl Into<EntityKey>, name: impl Into<String>, shares: Vec<u32>) -> Self {
        Self {
            sym: sym.into(),
            name: name.into(),
            shares,
            par_price: None,
            home: None,
            floated: false,
        }
    }

    pub fn with_par(mut self, par_price: i64) -> Self {
        self.par_price = Some(par_price);
        self
    }

    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Percentage of one ordinary share, the unit dividends are paid in.
    pub fn share_percent(&self) -> u32 {
        self.shares
            .get(1)
            .or_else(|| self.shares.first())
            .copied()
            .unwrap_or(10)
    }

    pub fn slots(&self) -> impl Iterator<Item = ShareSlot> + '_ {
        (0..self.shares.len()).map(|index| ShareSlot::new(self.sym.clone(), index))
    }

    pub fn percent_of_slot(&self, slot: &ShareSlot) -> Option<u32> {
        if slot.corporation != self.sym {
            return None;
        }
        self.shares.get(slot.index).copied()
    }
}

/// Registry of every draft item and corporation in a game.
#[derive(Debug, Clone, Default)]
pub struct Entities {
    items: BTreeMap<EntityKey, DraftItem>,
    corporations: BTreeMap<EntityKey, Corporation>,
}

impl Entities {
    pub fn new(
        items: impl IntoIterator<Item = DraftItem>,
        corporations: impl IntoIterator<Item = Corporation>,
    ) -> GameResult<Self> {
        let mut registry = Self::default();
        for item in items {
            let key = item.key().clone();
            if registry.items.insert(key.clone(), item).is_some() {
                return Err(GameError::consistency(format!("duplicate draft item {key}")));
            }
        }
        for corporation in corporations {
            let key = corporation.sym.clone();
            if registry.corporations.insert(key.clone(), corporation).is_some() {
                return Err(GameError::consistency(format!("duplicate corporation {key}")));
            }
        }
        Ok(registry)
    }

    pub fn item(&self, key: &EntityKey) -> GameResult<&DraftItem> {
        self.items
            .get(key)
            .ok_or_else(|| GameError::consistency(format!("unknown entity {key}")))
    }

    pub fn item_mut(&mut self, key: &EntityKey) -> GameResult<&mut DraftItem> {
        self.items
            .get_mut(key)
            .ok_or_else(|| GameError::consistency(format!("unknown entity {key}")))
    }

    pub fn contains_item(&self, key: &EntityKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn items(&self) -> impl Iterator<Item = &DraftItem> {
        self.items.values()
    }

    pub fn corporation(&self, key: &EntityKey) -> GameResult<&Corporation> {
        self.corporations
            .get(key)
            .ok_or_else(|| GameError::consistency(format!("unknown corporation {key}")))
    }

    pub fn corporation_mut(&mut self, key: &EntityKey) -> GameResult<&mut Corporation> {
        self.corporations
            .get_mut(key)
            .ok_or_else(|| GameError::consistency(format!("unknown corporation {key}")))
    }

    pub fn corporations(&self) -> impl Iterator<Item = &Corporation> {
        self.corporations.values()
    }

    /// Open items currently owned by `player`.
    pub fn owned_by(&self, player: PlayerId) -> impl Iterator<Item = &DraftItem> {
        self.items
            .values()
            .filter(move |item| item.owner() == Some(player) && !item.is_closed())
    }
}
