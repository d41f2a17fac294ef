//! Interface to the economic ledger, train depot, token map and operating
//! history the rules core drives.
//!
//! The core never mutates these resources directly; every effect is a single
//! call through [`Ledger`] so the collaborator owns serialisation of access.

/// In-memory implementation used by tests and the command line host.
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::{
    entity::{EntityKey, Holder, PlayerId},
    error::GameResult,
    shares::ShareSlot,
};

pub use memory::MemoryLedger;

/// Identifies one operating round: the game turn and the round within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatingTurn {
    /// Stock/operating turn number.
    pub turn: u32,
    /// Operating round within the turn.
    pub round: u32,
}

impl OperatingTurn {
    /// Build a turn identifier.
    pub fn new(turn: u32, round: u32) -> Self {
        Self { turn, round }
    }
}

/// A physical train card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    /// Unique card id, e.g. `2-0`.
    pub id: String,
    /// Train type, e.g. `2+2`.
    pub name: String,
    /// Face price.
    pub price: i64,
}

/// How much the receiving side pays for a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainPrice {
    /// Handed over without payment (formation and mergers).
    Free,
    /// Receiver pays the previous holder.
    Paid(i64),
}

/// Options for a certificate transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShareTransfer {
    /// Allow the recipient to become director as a side effect.
    pub allow_president_change: bool,
    /// Price the recipient pays the previous holder, if any.
    pub price: Option<i64>,
}

impl ShareTransfer {
    /// Unpaid transfer that may change the director, used for certificates
    /// handed out by the draft, formation and mergers.
    pub fn grant() -> Self {
        Self {
            allow_president_change: true,
            price: None,
        }
    }
}

/// Snapshot of one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    /// Certificate position.
    pub slot: ShareSlot,
    /// Percentage of the corporation it represents.
    pub percent: u32,
    /// Current holder; [`Holder::Bank`] is the IPO.
    pub holder: Holder,
    /// Whether the certificate may be traded normally.
    pub buyable: bool,
}

/// Operations the rules core needs from the economic subsystems.
pub trait Ledger {
    /// Cash held by `holder`.
    fn cash(&self, holder: &Holder) -> i64;

    /// Move a fixed amount of cash.
    fn transfer_cash(&mut self, from: &Holder, to: &Holder, amount: i64) -> GameResult<()>;

    /// Look up a certificate.
    fn share(&self, slot: &ShareSlot) -> Option<ShareInfo>;

    /// Hand a certificate to `to`, optionally paid and optionally changing the
    /// director.
    fn transfer_share(&mut self, slot: &ShareSlot, to: &Holder, transfer: ShareTransfer) -> GameResult<()>;

    /// Lock or unlock a certificate for normal trading.
    fn set_buyable(&mut self, slot: &ShareSlot, buyable: bool) -> GameResult<()>;

    /// Total percentage of `corporation` held by `holder`.
    fn percent_of(&self, holder: &Holder, corporation: &EntityKey) -> u32;

    /// Player holding the director's certificate.
    fn president_of(&self, corporation: &EntityKey) -> Option<PlayerId>;

    /// Trains held by `holder`; [`Holder::Bank`] is the depot.
    fn trains_of(&self, holder: &Holder) -> Vec<Train>;

    /// Maximum number of trains `owner` may hold.
    fn train_limit(&self, owner: &EntityKey) -> usize;

    /// Move one train, paying for it unless [`TrainPrice::Free`].
    fn transfer_train(&mut self, from: &Holder, to: &Holder, train_id: &str, price: TrainPrice) -> GameResult<()>;

    /// Return a train to the depot.
    fn discard_train(&mut self, from: &Holder, train_id: &str) -> GameResult<()>;

    /// Put a token of `owner` on the map.
    fn place_token(&mut self, location: &str, owner: &EntityKey) -> GameResult<()>;

    /// Owners of the tokens at `location`.
    fn tokens_at(&self, location: &str) -> Vec<EntityKey>;

    /// Swap the owner of a placed token, keeping its location.
    fn replace_token(&mut self, location: &str, from: &EntityKey, to: &EntityKey) -> GameResult<()>;

    /// Note that `entity` ran during `turn`.
    fn record_operation(&mut self, entity: &EntityKey, turn: OperatingTurn);

    /// Whether `entity` already ran during `turn`.
    fn operated_in(&self, entity: &EntityKey, turn: OperatingTurn) -> bool;
}
