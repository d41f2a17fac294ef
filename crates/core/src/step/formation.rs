//! Formation of the target corporation out of the designated minor.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    action::{Action, ActionKind, FORM_CHOICE},
    entity::{EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    ledger::{ShareTransfer, Train, TrainPrice},
    shares::ShareSlot,
    state::GameState,
    step::{Choice, Step},
};

/// Named events delivered by the train-purchase subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationEvent {
    /// The owner of the formation entity may now form the corporation.
    OptionalFormation,
    /// The corporation forms immediately if it has not yet.
    MandatoryFormation,
    /// Forces formation and makes every merger mandatory.
    MandatoryMergers,
}

/// How the corporation came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormedVia {
    /// The owner chose to form.
    Choice,
    /// A mandatory event formed it.
    Mandate,
}

/// Derived view of the formation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationPhase {
    /// No event has arrived yet.
    Dormant,
    /// Formation is permitted but has not happened.
    OptionalEligible,
    /// Terminal.
    Formed(FormedVia),
}

/// Formation flags, one per game session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationState {
    /// Whether the corporation exists.
    pub formed: bool,
    /// Formation may be chosen.
    pub optional_allowed: bool,
    /// Formation can no longer be declined.
    pub mandatory: bool,
    /// Mergers can no longer be declined.
    pub mergers_mandatory: bool,
    /// Set together with `formed`.
    pub formed_via: Option<FormedVia>,
}

impl FormationState {
    /// Current state machine position.
    pub fn phase(&self) -> FormationPhase {
        match self.formed_via {
            Some(via) if self.formed => FormationPhase::Formed(via),
            _ if self.allowed() => FormationPhase::OptionalEligible,
            _ => FormationPhase::Dormant,
        }
    }

    /// Some event has opened formation.
    pub fn allowed(&self) -> bool {
        self.optional_allowed || self.mandatory
    }

    /// Whether the merge step may run at all.
    pub fn mergers_allowed(&self) -> bool {
        self.formed && self.allowed()
    }
}

/// Blocking operating-round step offering the formation to the owner of the
/// formation entity.
#[derive(Debug, Default)]
pub struct FormationController {
    declined: bool,
}

impl FormationController {
    /// Fresh step for one operating round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event from the train-purchase subsystem. Mandatory events form
    /// the corporation before returning.
    pub fn handle_event(state: &mut GameState, event: FormationEvent) -> GameResult<()> {
        let target = state.reservations.target().clone();
        let forced = match event {
            FormationEvent::OptionalFormation => {
                if !state.formation.optional_allowed {
                    state.formation.optional_allowed = true;
                    state.log.push(format!("{target} may now be formed"));
                }
                false
            }
            FormationEvent::MandatoryFormation => true,
            FormationEvent::MandatoryMergers => true,
        };
        if !forced {
            info!(?event, %target, "formation event");
            return Ok(());
        }

        let plan = if state.formation.formed {
            None
        } else {
            Some(FormationPlan::prepare(state)?)
        };

        state.formation.mandatory = true;
        if event == FormationEvent::MandatoryMergers && !state.formation.mergers_mandatory {
            state.formation.mergers_mandatory = true;
            state.log.push(format!("Mergers into {target} are now mandatory"));
        }
        info!(?event, %target, "formation event");
        if let Some(plan) = plan {
            plan.apply(state, FormedVia::Mandate)?;
        }
        Ok(())
    }

    fn owner(state: &GameState) -> Option<PlayerId> {
        state
            .entities
            .item(state.reservations.director_entity())
            .ok()
            .filter(|item| !item.is_closed())
            .and_then(|item| item.owner())
    }

    fn ensure_actor(state: &GameState, actor: PlayerId) -> GameResult<()> {
        match Self::owner(state) {
            Some(owner) if owner == actor => Ok(()),
            _ => Err(GameError::invalid(format!(
                "{} does not own {}",
                state.player_name(actor),
                state.reservations.director_entity()
            ))),
        }
    }
}

impl Step for FormationController {
    fn description(&self) -> &'static str {
        "Form Prussian Railroad"
    }

    fn is_active(&self, state: &GameState) -> bool {
        !state.formation.formed && state.formation.allowed() && !self.declined && Self::owner(state).is_some()
    }

    fn current_actor(&self, state: &GameState) -> Option<PlayerId> {
        if self.is_active(state) {
            Self::owner(state)
        } else {
            None
        }
    }

    fn actions(&self, state: &GameState, actor: PlayerId) -> Vec<ActionKind> {
        if self.current_actor(state) != Some(actor) {
            return Vec::new();
        }
        if state.formation.mandatory {
            vec![ActionKind::Choose]
        } else {
            vec![ActionKind::Choose, ActionKind::Pass]
        }
    }

    fn choices(&self, state: &GameState) -> Vec<Choice> {
        if !self.is_active(state) {
            return Vec::new();
        }
        let target = state.reservations.target();
        let label = state
            .entities
            .corporation(target)
            .map(|corporation| format!("Form {}", corporation.name))
            .unwrap_or_else(|_| format!("Form {target}"));
        vec![Choice {
            key: FORM_CHOICE.to_string(),
            label,
        }]
    }

    fn process(&mut self, state: &mut GameState, action: &Action) -> GameResult<()> {
        match action {
            Action::Choose { entity, choice } => {
                if !self.is_active(state) {
                    return Err(GameError::invalid("formation is not available"));
                }
                Self::ensure_actor(state, *entity)?;
                if choice != FORM_CHOICE {
                    return Err(GameError::invalid(format!("unknown formation choice '{choice}'")));
                }
                let plan = FormationPlan::prepare(state)?;
                plan.apply(state, FormedVia::Choice)
            }
            Action::Pass { entity } => {
                if state.formation.mandatory {
                    return Err(GameError::MandatoryAction(format!(
                        "forming {}",
                        state.reservations.target()
                    )));
                }
                if !self.is_active(state) {
                    return Err(GameError::invalid("formation is not available"));
                }
                Self::ensure_actor(state, *entity)?;
                self.declined = true;
                let message = format!(
                    "{} declines to form {}",
                    state.player_name(*entity),
                    state.reservations.target()
                );
                debug!(player = %entity, "formation declined");
                state.log.push(message);
                Ok(())
            }
            Action::Bid { .. } => Err(GameError::invalid("bids are not accepted while forming")),
        }
    }
}

/// Token handling decided during validation.
enum TokenMove {
    Replace(String),
    Place(String),
    Keep,
}

/// Everything the formation touches, resolved and validated up front.
struct FormationPlan {
    target: EntityKey,
    source: EntityKey,
    owner: Option<PlayerId>,
    director_slot: ShareSlot,
    cash: i64,
    trains: Vec<Train>,
    token: TokenMove,
    open_slots: Vec<ShareSlot>,
}

impl FormationPlan {
    fn prepare(state: &GameState) -> GameResult<Self> {
        let target = state.reservations.target().clone();
        let source = state.reservations.director_entity().clone();
        let corporation = state.entities.corporation(&target)?;
        let item = state.entities.item(&source)?;
        if item.is_closed() {
            return Err(GameError::consistency(format!("{source} closed before {target} formed")));
        }

        let director_slot = state.reservations.director_slot().clone();
        match state.ledger.share(&director_slot) {
            Some(info) if info.holder == Holder::Bank => {}
            Some(info) => {
                return Err(GameError::consistency(format!(
                    "{director_slot} was already issued to {}",
                    info.holder
                )))
            }
            None => return Err(GameError::consistency(format!("missing share slot {director_slot}"))),
        }

        let home = item
            .home()
            .map(str::to_string)
            .or_else(|| corporation.home.clone());
        let token = match home {
            Some(home) if state.ledger.tokens_at(&home).contains(&source) => TokenMove::Replace(home),
            Some(home) if state.ledger.tokens_at(&home).contains(&target) => {
                debug!(%home, "corporation token already placed");
                TokenMove::Keep
            }
            Some(home) => TokenMove::Place(home),
            None => TokenMove::Keep,
        };

        let holder = Holder::entity(&source);
        let open_slots = corporation
            .slots()
            .filter(|slot| !state.reservations.is_reserved(slot))
            .collect();
        Ok(Self {
            owner: item.owner(),
            cash: state.ledger.cash(&holder),
            trains: state.ledger.trains_of(&holder),
            director_slot,
            token,
            open_slots,
            target,
            source,
        })
    }

    fn apply(self, state: &mut GameState, via: FormedVia) -> GameResult<()> {
        self.apply_ledger(state).map_err(GameError::into_fatal)?;

        state.entities.item_mut(&self.source)?.close();
        state.entities.corporation_mut(&self.target)?.floated = true;
        state.formation.formed = true;
        state.formation.formed_via = Some(via);

        let corporation_name = state
            .entities
            .corporation(&self.target)
            .map(|corporation| corporation.name.clone())
            .unwrap_or_else(|_| self.target.to_string());
        let message = match (via, self.owner) {
            (FormedVia::Choice, Some(owner)) => format!(
                "{} forms {corporation_name} from {}",
                state.player_name(owner),
                self.source
            ),
            _ => format!("{corporation_name} is formed from {}", self.source),
        };
        info!(
            target = %self.target,
            source = %self.source,
            cash = self.cash,
            trains = self.trains.len(),
            ?via,
            "corporation formed"
        );
        state.log.push(message);
        Ok(())
    }

    fn apply_ledger(&self, state: &mut GameState) -> GameResult<()> {
        let ledger = state.ledger.as_mut();
        let from = Holder::entity(&self.source);
        let to = Holder::entity(&self.target);

        ledger.set_buyable(&self.director_slot, true)?;
        if let Some(owner) = self.owner {
            ledger.transfer_share(&self.director_slot, &Holder::Player(owner), ShareTransfer::grant())?;
        }
        ledger.transfer_cash(&from, &to, self.cash)?;
        for train in &self.trains {
            ledger.transfer_train(&from, &to, &train.id, TrainPrice::Free)?;
        }
        match &self.token {
            TokenMove::Replace(home) => ledger.replace_token(home, &self.source, &self.target)?,
            TokenMove::Place(home) => ledger.place_token(home, &self.target)?,
            TokenMove::Keep => {}
        }
        for slot in &self.open_slots {
            ledger.set_buyable(slot, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{game_state, grant, key, p};

    fn slot(raw: &str) -> ShareSlot {
        ShareSlot::parse(raw).expect("valid slot")
    }

    #[test]
    fn phases_follow_flags() {
        let mut flags = FormationState::default();
        assert_eq!(flags.phase(), FormationPhase::Dormant);
        flags.optional_allowed = true;
        assert_eq!(flags.phase(), FormationPhase::OptionalEligible);
        assert!(!flags.mergers_allowed());
        flags.formed = true;
        flags.formed_via = Some(FormedVia::Choice);
        assert_eq!(flags.phase(), FormationPhase::Formed(FormedVia::Choice));
        assert!(flags.mergers_allowed());
    }

    #[test]
    fn dormant_step_offers_nothing() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(1), "P2")?;
        let step = FormationController::new();
        assert!(!step.is_active(&state));
        assert!(step.actions(&state, p(1)).is_empty());
        Ok(())
    }

    #[test]
    fn optional_event_offers_choice_to_owner_only() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(1), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::OptionalFormation)?;

        let step = FormationController::new();
        assert!(step.is_active(&state));
        assert_eq!(step.current_actor(&state), Some(p(1)));
        assert_eq!(step.actions(&state, p(1)), vec![ActionKind::Choose, ActionKind::Pass]);
        assert!(step.actions(&state, p(0)).is_empty());
        assert_eq!(step.choices(&state)[0].key, FORM_CHOICE);
        Ok(())
    }

    #[test]
    fn choosing_to_form_converts_the_minor() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(1), "P2")?;
        state.ledger.transfer_cash(&Holder::Bank, &Holder::entity(&key("P2")), 150)?;
        state
            .ledger
            .transfer_train(&Holder::Bank, &Holder::entity(&key("P2")), "2-0", TrainPrice::Free)?;
        FormationController::handle_event(&mut state, FormationEvent::OptionalFormation)?;

        let mut step = FormationController::new();
        step.process(
            &mut state,
            &Action::Choose {
                entity: p(1),
                choice: FORM_CHOICE.into(),
            },
        )?;

        let pr = key("PR");
        assert!(state.formation.formed);
        assert_eq!(state.formation.phase(), FormationPhase::Formed(FormedVia::Choice));
        assert_eq!(state.ledger.president_of(&pr), Some(p(1)));
        assert_eq!(state.ledger.cash(&Holder::entity(&pr)), 150);
        assert_eq!(state.ledger.cash(&Holder::entity(&key("P2"))), 0);
        assert_eq!(state.ledger.trains_of(&Holder::entity(&pr)).len(), 1);
        assert_eq!(state.ledger.tokens_at("E19"), vec![pr.clone()]);
        assert!(state.entities.item(&key("P2"))?.is_closed());
        assert!(state.entities.corporation(&pr)?.floated);
        assert!(!step.is_active(&state));

        let open = state.ledger.share(&slot("PR_5")).map(|info| info.buyable);
        let reserved = state.ledger.share(&slot("PR_3")).map(|info| info.buyable);
        assert_eq!(open, Some(true));
        assert_eq!(reserved, Some(false));
        Ok(())
    }

    #[test]
    fn decline_is_logged_and_keeps_the_step_quiet() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(2), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::OptionalFormation)?;

        let mut step = FormationController::new();
        let err = step
            .process(&mut state, &Action::Pass { entity: p(0) })
            .expect_err("not the owner");
        assert!(matches!(err, GameError::InvalidAction(_)));

        step.process(&mut state, &Action::Pass { entity: p(2) })?;
        assert!(!state.formation.formed);
        assert!(!step.is_active(&state));
        assert!(state.log.last().is_some_and(|line| line.contains("declines to form")));

        assert!(FormationController::new().is_active(&state));
        Ok(())
    }

    #[test]
    fn mandatory_event_forms_synchronously() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;

        assert!(state.formation.formed);
        assert!(state.formation.mandatory);
        assert_eq!(state.formation.formed_via, Some(FormedVia::Mandate));
        assert_eq!(state.ledger.president_of(&key("PR")), Some(p(0)));
        assert!(state.entities.item(&key("P2"))?.is_closed());
        Ok(())
    }

    #[test]
    fn pass_is_rejected_once_mandatory() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::OptionalFormation)?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;

        let mut step = FormationController::new();
        let err = step
            .process(&mut state, &Action::Pass { entity: p(0) })
            .expect_err("mandatory");
        assert!(matches!(err, GameError::MandatoryAction(_)));
        Ok(())
    }

    #[test]
    fn unowned_director_entity_leaves_director_share_in_ipo() -> GameResult<()> {
        let mut state = game_state(3)?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;

        assert!(state.formation.formed);
        let director = state.ledger.share(&slot("PR_0")).expect("director certificate");
        assert_eq!(director.holder, Holder::Bank);
        assert!(director.buyable);
        assert_eq!(state.ledger.president_of(&key("PR")), None);
        assert_eq!(state.ledger.tokens_at("E19"), vec![key("PR")]);
        Ok(())
    }

    #[test]
    fn mandatory_mergers_event_also_forms() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryMergers)?;
        assert!(state.formation.formed);
        assert!(state.formation.mergers_mandatory);
        assert!(state.formation.mergers_allowed());
        Ok(())
    }

    #[test]
    fn repeated_mandatory_event_is_a_no_op() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;
        let lines = state.log.entries().len();
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;
        assert_eq!(state.log.entries().len(), lines);
        Ok(())
    }
}
