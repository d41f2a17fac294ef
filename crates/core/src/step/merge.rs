//! Mergers of legacy companies and minors into the formed corporation.
//!
//! Players are asked in rotation, starting after the corporation's director.
//! Each legacy entity is handled at most once per operating round, either
//! merged or declined, and the player keeps the turn until none of their
//! entities is left.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::{
    action::{Action, ActionKind},
    entity::{EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    ledger::{Ledger, ShareTransfer, Train, TrainPrice},
    shares::ShareSlot,
    state::GameState,
    step::{Choice, Step},
};

/// Blocking operating-round step collecting mergers player by player.
#[derive(Debug, Default)]
pub struct MergeController {
    rotation: Option<Vec<PlayerId>>,
    processed: BTreeSet<EntityKey>,
}

impl MergeController {
    /// Fresh step for one operating round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `entity` was merged or declined during this round.
    pub fn is_processed(&self, entity: &EntityKey) -> bool {
        self.processed.contains(entity)
    }

    /// Legacy entities `player` still has to decide on, in key order.
    pub fn pending_for(&self, state: &GameState, player: PlayerId) -> Vec<EntityKey> {
        state
            .reservations
            .legacy_entities()
            .filter(|key| !self.processed.contains(*key))
            .filter(|key| {
                state
                    .entities
                    .item(key)
                    .map(|item| item.owner() == Some(player) && !item.is_closed())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn current_rotation(&self, state: &GameState) -> Vec<PlayerId> {
        match &self.rotation {
            Some(rotation) => rotation.clone(),
            None => state.rotation_after(state.ledger.president_of(state.reservations.target())),
        }
    }

    fn active_player(&self, state: &GameState) -> Option<PlayerId> {
        if !state.formation.mergers_allowed() {
            return None;
        }
        self.current_rotation(state)
            .into_iter()
            .find(|player| !self.pending_for(state, *player).is_empty())
    }

    fn ensure_actor(&self, state: &GameState, actor: PlayerId) -> GameResult<()> {
        match self.active_player(state) {
            None => Err(GameError::invalid("no mergers are pending")),
            Some(current) if current != actor => Err(GameError::invalid(format!(
                "{} is deciding on mergers, not {}",
                state.player_name(current),
                state.player_name(actor)
            ))),
            Some(_) => Ok(()),
        }
    }

    fn snapshot_rotation(&mut self, state: &GameState) {
        if self.rotation.is_none() {
            self.rotation = Some(self.current_rotation(state));
        }
    }

    fn settle(&mut self, state: &GameState) {
        if self.active_player(state).is_none() {
            debug!("merge queue drained");
            self.rotation = None;
        }
    }

    fn merge(&mut self, state: &mut GameState, actor: PlayerId, choice: &str) -> GameResult<()> {
        self.ensure_actor(state, actor)?;
        let plan = MergePlan::prepare(state, &self.processed, actor, &EntityKey::new(choice))?;
        self.snapshot_rotation(state);
        self.processed.insert(plan.entity.clone());
        plan.apply(state)?;
        self.settle(state);
        Ok(())
    }

    fn decline(&mut self, state: &mut GameState, actor: PlayerId) -> GameResult<()> {
        if state.formation.mergers_mandatory {
            return Err(GameError::MandatoryAction(format!(
                "merging into {}",
                state.reservations.target()
            )));
        }
        self.ensure_actor(state, actor)?;
        self.snapshot_rotation(state);

        let declined = self.pending_for(state, actor);
        self.processed.extend(declined.iter().cloned());
        info!(player = %actor, declined = declined.len(), "mergers declined");
        state.log.push(format!(
            "{} declines to merge remaining companies into {}",
            state.player_name(actor),
            state.reservations.target()
        ));
        self.settle(state);
        Ok(())
    }
}

impl Step for MergeController {
    fn description(&self) -> &'static str {
        "Merge into Prussian Railroad"
    }

    fn is_active(&self, state: &GameState) -> bool {
        self.active_player(state).is_some()
    }

    fn current_actor(&self, state: &GameState) -> Option<PlayerId> {
        self.active_player(state)
    }

    fn actions(&self, state: &GameState, actor: PlayerId) -> Vec<ActionKind> {
        if self.active_player(state) != Some(actor) {
            return Vec::new();
        }
        if state.formation.mergers_mandatory {
            vec![ActionKind::Choose]
        } else {
            vec![ActionKind::Choose, ActionKind::Pass]
        }
    }

    fn choices(&self, state: &GameState) -> Vec<Choice> {
        let Some(player) = self.active_player(state) else {
            return Vec::new();
        };
        let target = state.reservations.target();
        self.pending_for(state, player)
            .into_iter()
            .filter_map(|key| {
                let item = state.entities.item(&key).ok()?;
                Some(Choice {
                    label: format!("Merge {} into {target}", item.name()),
                    key: key.to_string(),
                })
            })
            .collect()
    }

    fn process(&mut self, state: &mut GameState, action: &Action) -> GameResult<()> {
        match action {
            Action::Choose { entity, choice } => self.merge(state, *entity, choice),
            Action::Pass { entity } => self.decline(state, *entity),
            Action::Bid { .. } => Err(GameError::invalid("bids are not accepted while merging")),
        }
    }
}

/// One merger, resolved and validated before anything moves.
struct MergePlan {
    entity: EntityKey,
    name: String,
    target: EntityKey,
    owner: PlayerId,
    slot: ShareSlot,
    percent: u32,
    cash: i64,
    trains: Vec<Train>,
    token_at: Option<String>,
    operated: bool,
}

impl MergePlan {
    fn prepare(
        state: &GameState,
        processed: &BTreeSet<EntityKey>,
        actor: PlayerId,
        entity: &EntityKey,
    ) -> GameResult<Self> {
        let target = state.reservations.target().clone();
        state.entities.corporation(&target)?;
        let item = state.entities.item(entity)?;
        let Some(slot) = state.reservations.slot_for(entity) else {
            return Err(GameError::invalid(format!("{entity} cannot merge into {target}")));
        };
        if item.owner() != Some(actor) {
            return Err(GameError::invalid(format!(
                "{entity} is not owned by {}",
                state.player_name(actor)
            )));
        }
        if item.is_closed() {
            return Err(GameError::invalid(format!("{entity} is already closed")));
        }
        if processed.contains(entity) {
            return Err(GameError::invalid(format!("{entity} has already been processed")));
        }

        let percent = match state.ledger.share(slot) {
            Some(info) if info.holder == Holder::Bank => info.percent,
            Some(info) => {
                return Err(GameError::consistency(format!(
                    "reserved share {slot} of {entity} is already held by {}",
                    info.holder
                )))
            }
            None => return Err(GameError::consistency(format!("missing share slot {slot}"))),
        };

        let holder = Holder::entity(entity);
        let token_at = item
            .home()
            .filter(|home| state.ledger.tokens_at(home).contains(entity))
            .map(str::to_string);
        Ok(Self {
            name: item.name().to_string(),
            owner: actor,
            slot: slot.clone(),
            percent,
            cash: state.ledger.cash(&holder),
            trains: state.ledger.trains_of(&holder),
            token_at,
            operated: state.operated_this_round(entity),
            entity: entity.clone(),
            target,
        })
    }

    fn apply(self, state: &mut GameState) -> GameResult<()> {
        let (kept, discarded) = self
            .apply_ledger(state.ledger.as_mut())
            .map_err(GameError::into_fatal)?;

        state.entities.item_mut(&self.entity)?.close();
        if let Some(round) = state.operating.as_mut().filter(|_| self.operated) {
            round.non_paying.exclude(self.owner, &self.target, self.percent);
        }

        let player = state.player_name(self.owner);
        info!(
            player = %player,
            entity = %self.entity,
            slot = %self.slot,
            cash = self.cash,
            kept,
            discarded,
            operated = self.operated,
            "merged into {}",
            self.target
        );
        let mut message = format!(
            "{player} merges {} into {} and receives the {} share",
            self.name, self.target, self.slot
        );
        if self.operated {
            message.push_str(" (no dividend this round)");
        }
        state.log.push(message);
        if discarded > 0 {
            state.log.push(format!(
                "{} is at its train limit, {discarded} train(s) of {} are discarded",
                self.target, self.entity
            ));
        }
        Ok(())
    }

    fn apply_ledger(&self, ledger: &mut dyn Ledger) -> GameResult<(usize, usize)> {
        let from = Holder::entity(&self.entity);
        let to = Holder::entity(&self.target);

        ledger.set_buyable(&self.slot, true)?;
        ledger.transfer_share(&self.slot, &Holder::Player(self.owner), ShareTransfer::grant())?;
        ledger.transfer_cash(&from, &to, self.cash)?;

        let limit = ledger.train_limit(&self.target);
        let mut fleet = ledger.trains_of(&to).len();
        let (mut kept, mut discarded) = (0, 0);
        for train in &self.trains {
            if fleet < limit {
                ledger.transfer_train(&from, &to, &train.id, TrainPrice::Free)?;
                fleet += 1;
                kept += 1;
            } else {
                ledger.discard_train(&from, &train.id)?;
                discarded += 1;
            }
        }

        if let Some(location) = &self.token_at {
            ledger.replace_token(location, &self.entity, &self.target)?;
        }
        Ok((kept, discarded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::OperatingTurn,
        step::formation::{FormationController, FormationEvent},
        test_support::{game_state, grant, key, p},
    };

    fn choose(player: usize, choice: &str) -> Action {
        Action::Choose {
            entity: p(player),
            choice: choice.into(),
        }
    }

    /// Three players; seat 0 forms PR via P2 and owns HB, seat 1 owns P1 and
    /// P3, seat 2 owns P4.
    fn formed_state() -> GameResult<GameState> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        grant(&mut state, p(0), "HB")?;
        grant(&mut state, p(1), "P1")?;
        grant(&mut state, p(1), "P3")?;
        grant(&mut state, p(2), "P4")?;
        state.begin_operating_round(OperatingTurn::new(2, 1));
        FormationController::handle_event(&mut state, FormationEvent::OptionalFormation)?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;
        Ok(state)
    }

    #[test]
    fn inactive_before_formation() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(1), "P1")?;
        let step = MergeController::new();
        assert!(!step.is_active(&state));
        Ok(())
    }

    #[test]
    fn rotation_starts_after_the_director() -> GameResult<()> {
        let state = formed_state()?;
        let step = MergeController::new();
        assert_eq!(step.current_actor(&state), Some(p(1)));
        let keys: Vec<_> = step.choices(&state).into_iter().map(|choice| choice.key).collect();
        assert_eq!(keys, vec!["P1".to_string(), "P3".to_string()]);
        Ok(())
    }

    #[test]
    fn player_keeps_the_turn_until_done() -> GameResult<()> {
        let mut state = formed_state()?;
        let mut step = MergeController::new();

        step.process(&mut state, &choose(1, "P1"))?;
        assert_eq!(step.current_actor(&state), Some(p(1)));
        assert_eq!(step.pending_for(&state, p(1)), vec![key("P3")]);

        step.process(&mut state, &choose(1, "P3"))?;
        assert_eq!(step.current_actor(&state), Some(p(2)));
        Ok(())
    }

    #[test]
    fn merge_moves_share_cash_trains_and_token() -> GameResult<()> {
        let mut state = formed_state()?;
        let p1 = Holder::entity(&key("P1"));
        state.ledger.transfer_cash(&Holder::Bank, &p1, 70)?;
        state.ledger.transfer_train(&Holder::Bank, &p1, "2-1", TrainPrice::Free)?;

        let mut step = MergeController::new();
        step.process(&mut state, &choose(1, "P1"))?;

        let pr = key("PR");
        let slot = ShareSlot::new("PR", 8);
        assert_eq!(state.ledger.share(&slot).map(|info| info.holder), Some(Holder::Player(p(1))));
        assert_eq!(state.ledger.cash(&Holder::entity(&pr)), 70);
        assert_eq!(state.ledger.trains_of(&Holder::entity(&pr)).len(), 1);
        assert_eq!(state.ledger.tokens_at("H2"), vec![pr]);
        assert!(state.entities.item(&key("P1"))?.is_closed());
        assert!(step.is_processed(&key("P1")));
        Ok(())
    }

    #[test]
    fn merging_never_touches_other_reserved_slots() -> GameResult<()> {
        let mut state = formed_state()?;
        let mut step = MergeController::new();
        step.process(&mut state, &choose(1, "P3"))?;

        for (entity, raw) in [("P1", "PR_8"), ("P4", "PR_3"), ("HB", "PR_1")] {
            let info = state.ledger.share(&ShareSlot::parse(raw)?).expect("slot exists");
            assert_eq!(info.holder, Holder::Bank, "{entity}'s slot moved");
            assert!(!info.buyable);
        }
        let p3 = state.ledger.share(&ShareSlot::parse("PR_9")?).expect("slot exists");
        assert_eq!(p3.holder, Holder::Player(p(1)));
        Ok(())
    }

    #[test]
    fn operated_entity_excludes_only_its_own_share() -> GameResult<()> {
        let mut state = formed_state()?;
        state.ledger.record_operation(&key("P1"), OperatingTurn::new(2, 1));
        let mut step = MergeController::new();
        step.process(&mut state, &choose(1, "P1"))?;
        step.process(&mut state, &choose(1, "P3"))?;

        let pr = key("PR");
        assert_eq!(state.non_paying_percent(p(1), &pr), 5);
        assert_eq!(state.non_paying_percent(p(0), &pr), 0);
        assert_eq!(state.non_paying_percent(p(2), &pr), 0);
        Ok(())
    }

    #[test]
    fn idle_minor_share_still_pays_next_to_an_operated_one() -> GameResult<()> {
        let mut state = formed_state()?;
        state.ledger.record_operation(&key("P1"), OperatingTurn::new(2, 1));
        let mut step = MergeController::new();
        step.process(&mut state, &choose(1, "P1"))?;
        step.process(&mut state, &choose(1, "P3"))?;

        let pr = key("PR");
        assert_eq!(state.ledger.percent_of(&Holder::Player(p(1)), &pr), 10);
        assert_eq!(crate::dividend::dividend_for(&state, p(1), &pr, 20)?, 10);
        Ok(())
    }

    #[test]
    fn full_fleet_discards_incoming_trains() -> GameResult<()> {
        let mut state = formed_state()?;
        let pr = Holder::entity(&key("PR"));
        for id in ["2-0", "2-1", "2-2", "2-3"] {
            state.ledger.transfer_train(&Holder::Bank, &pr, id, TrainPrice::Free)?;
        }
        let p4 = Holder::entity(&key("P4"));
        state.ledger.transfer_train(&Holder::Bank, &p4, "2-4", TrainPrice::Free)?;
        let depot_before = state.ledger.trains_of(&Holder::Bank).len();

        let mut step = MergeController::new();
        step.process(&mut state, &Action::Pass { entity: p(1) })?;
        step.process(&mut state, &choose(2, "P4"))?;

        assert_eq!(state.ledger.trains_of(&pr).len(), 4);
        assert!(state.ledger.trains_of(&p4).is_empty());
        assert_eq!(state.ledger.trains_of(&Holder::Bank).len(), depot_before + 1);
        Ok(())
    }

    #[test]
    fn decline_marks_every_remaining_entity() -> GameResult<()> {
        let mut state = formed_state()?;
        let mut step = MergeController::new();
        step.process(&mut state, &Action::Pass { entity: p(1) })?;

        assert!(step.is_processed(&key("P1")));
        assert!(step.is_processed(&key("P3")));
        assert!(!state.entities.item(&key("P1"))?.is_closed());
        assert_eq!(step.current_actor(&state), Some(p(2)));

        step.process(&mut state, &Action::Pass { entity: p(2) })?;
        assert_eq!(step.current_actor(&state), Some(p(0)));
        step.process(&mut state, &choose(0, "HB"))?;
        assert!(!step.is_active(&state));
        Ok(())
    }

    #[test]
    fn invalid_choices_are_rejected_without_changes() -> GameResult<()> {
        let mut state = formed_state()?;
        let mut step = MergeController::new();

        let wrong_player = step.process(&mut state, &choose(2, "P4")).expect_err("not p2's turn");
        assert!(matches!(wrong_player, GameError::InvalidAction(_)));

        let not_owned = step.process(&mut state, &choose(1, "P4")).expect_err("owned by p2");
        assert!(matches!(not_owned, GameError::InvalidAction(_)));

        let not_legacy = step.process(&mut state, &choose(1, "NF")).expect_err("not reserved");
        assert!(matches!(not_legacy, GameError::InvalidAction(_)));

        let unknown = step.process(&mut state, &choose(1, "XX")).expect_err("unknown key");
        assert!(unknown.is_fatal());

        assert!(step.pending_for(&state, p(1)).len() == 2);
        assert!(state.log.messages().all(|line| !line.contains("merges")));
        Ok(())
    }

    #[test]
    fn mandatory_mergers_refuse_pass() -> GameResult<()> {
        let mut state = formed_state()?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryMergers)?;
        let mut step = MergeController::new();

        assert_eq!(step.actions(&state, p(1)), vec![ActionKind::Choose]);
        for player in 0..3 {
            let err = step
                .process(&mut state, &Action::Pass { entity: p(player) })
                .expect_err("mergers are mandatory");
            assert!(matches!(err, GameError::MandatoryAction(_)));
        }
        assert_eq!(step.pending_for(&state, p(1)), vec![key("P1"), key("P3")]);
        Ok(())
    }

    #[test]
    fn rotation_snapshot_survives_director_change() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        grant(&mut state, p(1), "HB")?;
        grant(&mut state, p(1), "BB")?;
        grant(&mut state, p(2), "P4")?;
        state.begin_operating_round(OperatingTurn::new(2, 1));
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;

        let pr = key("PR");
        let buyer = Holder::Player(p(1));
        state.ledger.transfer_share(&ShareSlot::new("PR", 4), &buyer, ShareTransfer::grant())?;

        let mut step = MergeController::new();
        step.process(&mut state, &choose(1, "HB"))?;
        assert_eq!(state.ledger.president_of(&pr), Some(p(1)));
        assert_eq!(step.current_actor(&state), Some(p(1)));
        step.process(&mut state, &choose(1, "BB"))?;
        assert_eq!(step.current_actor(&state), Some(p(2)));
        Ok(())
    }
}
