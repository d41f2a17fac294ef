#![warn(clippy::all, missing_docs)]

//! Rules core for 1835: the start packet draft, the Prussian formation and
//! the forced mergers into it.
//!
//! The crate holds the entity model, the draft grid, the reserved-share
//! mapping, the steps and round driver, and the configuration used by the
//! command line host. Cash, certificates, trains and tokens live behind the
//! [`Ledger`] trait.

pub mod action;
pub mod catalog;
pub mod config;
pub mod dividend;
pub mod entity;
pub mod error;
pub mod game;
pub mod grid;
pub mod ledger;
pub mod nationalization;
pub mod round;
pub mod shares;
pub mod state;
pub mod step;

#[cfg(test)]
mod test_support;

pub use action::{Action, ActionKind, FORM_CHOICE};
pub use catalog::Catalog;
pub use config::GameConfig;
pub use entity::{EntityKey, Holder, PlayerId};
pub use error::{GameError, GameResult};
pub use game::Game;
pub use ledger::{Ledger, MemoryLedger, OperatingTurn};
pub use round::RoundKind;
pub use shares::ShareSlot;
pub use state::GameState;
pub use step::{DraftAllocator, FormationController, FormationEvent, MergeController, Step};
