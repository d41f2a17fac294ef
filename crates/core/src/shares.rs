#![allow(missing_docs)]

//! Share slot identifiers and the reserved-share mapping used by mergers.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{Corporation, EntityKey},
    error::{GameError, GameResult},
};

static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9]*)_(\d+)$").expect("failed to compile share slot regex"));

/// A single certificate position inside a corporation's share ledger, written
/// `PR_3` in the game data. Index 0 is always the director's certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareSlot {
    pub corporation: EntityKey,
    pub index: usize,
}

impl ShareSlot {
    pub fn new(corporation: impl Into<EntityKey>, index: usize) -> Self {
        Self {
            corporation: corporation.into(),
            index,
        }
    }

    /// The director's certificate of `corporation`.
    pub fn director(corporation: impl Into<EntityKey>) -> Self {
        Self::new(corporation, 0)
    }

    pub fn is_director(&self) -> bool {
        self.index == 0
    }

    pub fn parse(raw: &str) -> GameResult<Self> {
        let captures = SLOT_RE
            .captures(raw.trim())
            .ok_or_else(|| GameError::consistency(format!("malformed share slot '{raw}'")))?;
        let corporation = captures
            .get(1)
            .map(|m| m.as_str())
            .ok_or_else(|| GameError::consistency(format!("malformed share slot '{raw}'")))?;
        let index = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .ok_or_else(|| GameError::consistency(format!("invalid share index in '{raw}'")))?;
        Ok(Self::new(corporation, index))
    }
}

impl fmt::Display for ShareSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.corporation, self.index)
    }
}

impl FromStr for ShareSlot {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShareSlot {
    type Error = GameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShareSlot> for String {
    fn from(slot: ShareSlot) -> Self {
        slot.to_string()
    }
}

/// Raw reservation data as written in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationTable {
    /// Corporation receiving the mergers.
    pub target: String,
    /// Entity whose conversion forms the corporation.
    pub director_entity: String,
    /// Slot handed to the director entity's owner at formation.
    pub director_slot: String,
    /// Legacy entity key to reserved slot.
    pub entries: Vec<(String, String)>,
}

/// Identity-keyed mapping from legacy entities to the certificates reserved for
/// them in the target corporation.
///
/// The mapping is injective and never contains the director slot; the director
/// entity is tracked separately.
#[derive(Debug, Clone)]
pub struct ShareReservations {
    target: EntityKey,
    director_entity: EntityKey,
    director_slot: ShareSlot,
    slots: BTreeMap<EntityKey, ShareSlot>,
}

impl ShareReservations {
    pub fn new(
        target: impl Into<EntityKey>,
        director_entity: impl Into<EntityKey>,
        director_slot: ShareSlot,
        entries: impl IntoIterator<Item = (EntityKey, ShareSlot)>,
    ) -> GameResult<Self> {
        let target = target.into();
        let director_entity = director_entity.into();
        if director_slot.corporation != target || !director_slot.is_director() {
            return Err(GameError::consistency(format!(
                "director slot {director_slot} is not the director certificate of {target}"
            )));
        }

        let mut slots = BTreeMap::new();
        let mut seen = BTreeSet::from([director_slot.clone()]);
        for (entity, slot) in entries {
            if slot.corporation != target {
                return Err(GameError::consistency(format!(
                    "{entity} reserves {slot}, which does not belong to {target}"
                )));
            }
            if entity == director_entity {
                return Err(GameError::consistency(format!(
                    "{entity} is the director entity and cannot reserve {slot}"
                )));
            }
            if !seen.insert(slot.clone()) {
                return Err(GameError::consistency(format!(
                    "share slot {slot} is reserved more than once"
                )));
            }
            if slots.insert(entity.clone(), slot).is_some() {
                return Err(GameError::consistency(format!(
                    "{entity} has more than one reserved share"
                )));
            }
        }

        Ok(Self {
            target,
            director_entity,
            director_slot,
            slots,
        })
    }

    pub fn from_table(table: &ReservationTable) -> GameResult<Self> {
        let entries = table
            .entries
            .iter()
            .map(|(entity, slot)| Ok((EntityKey::new(entity.as_str()), ShareSlot::parse(slot)?)))
            .collect::<GameResult<Vec<_>>>()?;
        Self::new(
            table.target.as_str(),
            table.director_entity.as_str(),
            ShareSlot::parse(&table.director_slot)?,
            entries,
        )
    }

    /// Check every reserved slot exists in the corporation's share layout.
    pub fn validate_against(&self, corporation: &Corporation) -> GameResult<()> {
        if corporation.sym != self.target {
            return Err(GameError::consistency(format!(
                "reservations target {} but were checked against {}",
                self.target, corporation.sym
            )));
        }
        let count = corporation.shares.len();
        for slot in self.slots.values().chain(std::iter::once(&self.director_slot)) {
            if slot.index >= count {
                return Err(GameError::consistency(format!(
                    "reserved slot {slot} does not exist ({} has {count} certificates)",
                    self.target
                )));
            }
        }
        Ok(())
    }

    pub fn target(&self) -> &EntityKey {
        &self.target
    }

    pub fn director_entity(&self) -> &EntityKey {
        &self.director_entity
    }

    pub fn director_slot(&self) -> &ShareSlot {
        &self.director_slot
    }

    pub fn slot_for(&self, entity: &EntityKey) -> Option<&ShareSlot> {
        self.slots.get(entity)
    }

    /// Entities eligible to merge, in key order.
    pub fn legacy_entities(&self) -> impl Iterator<Item = &EntityKey> {
        self.slots.keys()
    }

    pub fn is_legacy(&self, entity: &EntityKey) -> bool {
        self.slots.contains_key(entity)
    }

    /// Whether `slot` is held back for a merger or for the director.
    pub fn is_reserved(&self, slot: &ShareSlot) -> bool {
        *slot == self.director_slot || self.slots.values().any(|reserved| reserved == slot)
    }
}
