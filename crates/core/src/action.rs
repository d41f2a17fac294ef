//! Actions submitted by the host scheduler.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKey, PlayerId};

/// Choice key that converts the formation entity into the corporation.
pub const FORM_CHOICE: &str = "form";

/// One player action. Every action names its acting player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Buy a draft item for `price`.
    Bid {
        /// Acting player.
        entity: PlayerId,
        /// Item on offer.
        item: EntityKey,
        /// Offered price; at least the item's minimum bid.
        price: i64,
    },
    /// Decline the current opportunity.
    Pass {
        /// Acting player.
        entity: PlayerId,
    },
    /// Pick one of the step's listed choices.
    Choose {
        /// Acting player.
        entity: PlayerId,
        /// `"form"` or an entity key.
        choice: String,
    },
}

impl Action {
    /// Player performing the action.
    pub fn actor(&self) -> PlayerId {
        match self {
            Action::Bid { entity, .. } | Action::Pass { entity } | Action::Choose { entity, .. } => *entity,
        }
    }

    /// Kind without payload.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Bid { .. } => ActionKind::Bid,
            Action::Pass { .. } => ActionKind::Pass,
            Action::Choose { .. } => ActionKind::Choose,
        }
    }
}

/// Action kinds a step can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// See [`Action::Bid`].
    Bid,
    /// See [`Action::Pass`].
    Pass,
    /// See [`Action::Choose`].
    Choose,
}
