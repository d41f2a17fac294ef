//! Start packet layout and the draft availability window.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entities, EntityKey},
    error::{GameError, GameResult},
};

/// Row and column of a draft item in the start packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    /// Packet row; lower rows are offered first.
    pub row: u32,
    /// Position within the row.
    pub column: u32,
}

/// Fixed layout of the start packet.
///
/// Positions are assigned once at setup. Ownership is not stored here; every
/// query takes an ownership predicate so the grid stays immutable.
#[derive(Debug, Clone)]
pub struct AuctionGrid {
    slots: Vec<(GridPosition, EntityKey)>,
}

impl AuctionGrid {
    /// Build a grid, rejecting two items placed in the same cell.
    pub fn new(slots: impl IntoIterator<Item = (GridPosition, EntityKey)>) -> GameResult<Self> {
        let mut slots: Vec<_> = slots.into_iter().collect();
        slots.sort();
        let mut seen = HashSet::new();
        for (position, key) in &slots {
            if !seen.insert(*position) {
                return Err(GameError::consistency(format!(
                    "{key} shares row {} column {} with another item",
                    position.row, position.column
                )));
            }
        }
        Ok(Self { slots })
    }

    /// Lay out every draft item of the registry.
    pub fn from_entities(entities: &Entities) -> GameResult<Self> {
        Self::new(
            entities
                .items()
                .map(|item| (item.position, item.key().clone())),
        )
    }

    /// Number of items in the packet.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the packet has no items at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cell of `key`, if it is part of the packet.
    pub fn position(&self, key: &EntityKey) -> Option<GridPosition> {
        self.slots
            .iter()
            .find(|(_, slot_key)| slot_key == key)
            .map(|(position, _)| *position)
    }

    /// Items currently on offer.
    ///
    /// All unowned items of the lowest row that still has any. When that row is
    /// down to a single item, the first unowned item of the next row with
    /// unowned items is offered as well. Empty once everything is owned.
    pub fn available<F>(&self, is_owned: F) -> Vec<EntityKey>
    where
        F: Fn(&EntityKey) -> bool,
    {
        let mut unowned = self.slots.iter().filter(|(_, key)| !is_owned(key));
        let Some((first, first_key)) = unowned.next() else {
            return Vec::new();
        };

        let active_row = first.row;
        let mut offered = vec![first_key.clone()];
        let mut preview = None;
        for (position, key) in unowned {
            if position.row == active_row {
                offered.push(key.clone());
            } else {
                preview = Some(key.clone());
                break;
            }
        }

        if offered.len() == 1 {
            offered.extend(preview);
        }
        offered
    }

    /// [`AuctionGrid::available`] against the registry's ownership markers.
    pub fn available_in(&self, entities: &Entities) -> Vec<EntityKey> {
        self.available(|key| {
            entities
                .item(key)
                .map(|item| item.is_owned())
                .unwrap_or(true)
        })
    }

    /// Draft terminal condition: nothing left on offer.
    pub fn is_exhausted_in(&self, entities: &Entities) -> bool {
        self.available_in(entities).is_empty()
    }
}
