//! Steps are the units a round is composed of. Each one owns the turn state
//! of a single rules procedure and reads or mutates the shared [`GameState`].

/// Draft allocation over the start packet.
pub mod draft;
/// Conversion of the formation entity into the corporation.
pub mod formation;
/// Forced mergers of legacy entities into the formed corporation.
pub mod merge;

use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, ActionKind},
    entity::PlayerId,
    error::GameResult,
    state::GameState,
};

pub use draft::{DraftAllocator, DraftStatus};
pub use formation::{FormationController, FormationEvent, FormationPhase, FormationState, FormedVia};
pub use merge::MergeController;

/// One selectable option of a `choose` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Value to send back as `choice`.
    pub key: String,
    /// Human-readable label.
    pub label: String,
}

/// Capability interface shared by every step.
pub trait Step {
    /// Short label shown to players.
    fn description(&self) -> &'static str;

    /// Whether the step currently waits for an action.
    fn is_active(&self, state: &GameState) -> bool;

    /// Player expected to act next, if any.
    fn current_actor(&self, state: &GameState) -> Option<PlayerId>;

    /// Actions `actor` may submit right now.
    fn actions(&self, state: &GameState, actor: PlayerId) -> Vec<ActionKind>;

    /// Options for a `choose` action.
    fn choices(&self, _state: &GameState) -> Vec<Choice> {
        Vec::new()
    }

    /// Validate and apply `action`. On error nothing has changed unless the
    /// error is fatal.
    fn process(&mut self, state: &mut GameState, action: &Action) -> GameResult<()>;
}
