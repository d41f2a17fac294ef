//! Generic round driver composing steps.

use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, ActionKind},
    entity::PlayerId,
    error::{GameError, GameResult},
    ledger::OperatingTurn,
    state::GameState,
    step::{Choice, DraftAllocator, FormationController, MergeController, Step},
};

/// Round types the session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundKind {
    /// Initial allocation of the start packet.
    Draft,
    /// Share trading, run by the host's stock engine.
    Stock,
    /// Operating round with the formation and merge blocking steps.
    Operating(OperatingTurn),
}

/// A round: an ordered list of steps, the first active one takes actions.
pub struct Round {
    kind: RoundKind,
    steps: Vec<Box<dyn Step>>,
}

impl Round {
    /// Draft round with players seated in `order`. Players who cannot afford
    /// anything are passed over right away.
    pub fn draft(state: &mut GameState, order: Vec<PlayerId>) -> Self {
        let mut draft = DraftAllocator::new(order);
        draft.skip_unaffordable(state);
        Self {
            kind: RoundKind::Draft,
            steps: vec![Box::new(draft)],
        }
    }

    /// Stock round; the rules core contributes no steps to it.
    pub fn stock() -> Self {
        Self {
            kind: RoundKind::Stock,
            steps: Vec::new(),
        }
    }

    /// Operating round: formation first, then mergers.
    pub fn operating(turn: OperatingTurn) -> Self {
        Self {
            kind: RoundKind::Operating(turn),
            steps: vec![Box::new(FormationController::new()), Box::new(MergeController::new())],
        }
    }

    /// Round type.
    pub fn kind(&self) -> RoundKind {
        self.kind
    }

    /// First step waiting for an action.
    pub fn active_step(&self, state: &GameState) -> Option<&dyn Step> {
        self.steps
            .iter()
            .find(|step| step.is_active(state))
            .map(|step| step.as_ref())
    }

    /// Whether no step waits for an action.
    pub fn is_finished(&self, state: &GameState) -> bool {
        self.active_step(state).is_none()
    }

    /// Player the active step waits for.
    pub fn current_actor(&self, state: &GameState) -> Option<PlayerId> {
        self.active_step(state)
            .and_then(|step| step.current_actor(state))
    }

    /// Actions `actor` may take in the active step.
    pub fn actions_for(&self, state: &GameState, actor: PlayerId) -> Vec<ActionKind> {
        self.active_step(state)
            .map(|step| step.actions(state, actor))
            .unwrap_or_default()
    }

    /// Choices offered by the active step.
    pub fn choices(&self, state: &GameState) -> Vec<Choice> {
        self.active_step(state)
            .map(|step| step.choices(state))
            .unwrap_or_default()
    }

    /// Hand `action` to the first active step.
    pub fn process(&mut self, state: &mut GameState, action: &Action) -> GameResult<()> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.is_active(state))
            .ok_or_else(|| GameError::invalid(format!("no step in the {:?} round accepts actions", self.kind)))?;
        step.process(state, action)
    }
}
