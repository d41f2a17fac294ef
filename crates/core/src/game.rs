//! Game session: owns the state and the current round, routes actions and
//! collaborator events, and halts on the first fatal error.

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::{
    action::{Action, ActionKind},
    catalog::{format_currency, Catalog},
    config::GameConfig,
    dividend,
    entity::{EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    ledger::{Ledger, MemoryLedger, OperatingTurn, TrainPrice},
    nationalization,
    round::{Round, RoundKind},
    shares::ShareSlot,
    state::GameState,
    step::{Choice, FormationController},
};

/// One running game.
pub struct Game {
    catalog: Catalog,
    state: GameState,
    round: Round,
    halted: Option<String>,
    triggered: Vec<String>,
}

impl Game {
    /// Set up the 1835 start packet for the configured table.
    pub fn new(config: &GameConfig, ledger: Box<dyn Ledger>) -> anyhow::Result<Self> {
        Self::with_catalog(config, Catalog::g1835(), ledger)
    }

    /// 1835 game backed by a [`MemoryLedger`] whose bank holds the configured
    /// cash.
    pub fn in_memory(config: &GameConfig) -> anyhow::Result<Self> {
        let mut catalog = Catalog::g1835();
        catalog.bank_cash = config.bank_cash;
        let ledger = Box::new(MemoryLedger::from_catalog(&catalog));
        Self::with_catalog(config, catalog, ledger)
    }

    /// Set up a game from an arbitrary catalog.
    pub fn with_catalog(config: &GameConfig, catalog: Catalog, ledger: Box<dyn Ledger>) -> anyhow::Result<Self> {
        config.validate(&catalog)?;
        let starting_cash = config.starting_cash_for(&catalog)?;
        let mut state = GameState::new(config.players.clone(), &catalog, ledger, starting_cash)
            .context("failed to set up the game state")?;
        let round = Round::draft(&mut state, config.draft_order());
        info!(
            game = %catalog.meta.display_name(),
            players = config.players.len(),
            starting_cash,
            "game created"
        );
        let mut game = Self {
            catalog,
            state,
            round,
            halted: None,
            triggered: Vec::new(),
        };
        game.advance_finished_draft();
        Ok(game)
    }

    /// Read-only game state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Write access for the host's own subsystems (revenue, stock trades).
    pub fn ledger_mut(&mut self) -> &mut dyn Ledger {
        self.state.ledger_mut()
    }

    /// Game data this session was built from.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Type of the running round.
    pub fn round_kind(&self) -> RoundKind {
        self.round.kind()
    }

    /// Whether a fatal error stopped the session.
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Player the active step waits for.
    pub fn current_actor(&self) -> Option<PlayerId> {
        if self.is_halted() {
            return None;
        }
        self.round.current_actor(&self.state)
    }

    /// Actions `actor` may submit now.
    pub fn actions_for(&self, actor: PlayerId) -> Vec<ActionKind> {
        if self.is_halted() {
            return Vec::new();
        }
        self.round.actions_for(&self.state, actor)
    }

    /// Options for a `choose` action in the active step.
    pub fn choices(&self) -> Vec<Choice> {
        if self.is_halted() {
            return Vec::new();
        }
        self.round.choices(&self.state)
    }

    /// Draft items currently on offer.
    pub fn available(&self) -> Vec<EntityKey> {
        self.state.available()
    }

    /// Submit a player action to the running round.
    pub fn process(&mut self, action: &Action) -> GameResult<()> {
        self.ensure_running()?;
        let result = self.round.process(&mut self.state, action);
        let result = self.guard(result);
        if let Err(err) = &result {
            debug!(actor = %action.actor(), kind = ?action.kind(), %err, "action rejected");
        }
        result?;
        self.advance_finished_draft();
        Ok(())
    }

    /// Report a train purchase made by the host's train subsystem. The first
    /// purchase of a trigger type fires its formation event.
    pub fn train_purchased(&mut self, train_name: &str) -> GameResult<()> {
        self.ensure_running()?;
        if self.triggered.iter().any(|name| name == train_name) {
            return Ok(());
        }
        let Some(event) = self.catalog.formation_event(train_name) else {
            return Ok(());
        };
        self.triggered.push(train_name.to_string());
        info!(train = train_name, ?event, "first train of its type bought");
        let result = FormationController::handle_event(&mut self.state, event);
        self.guard(result)
    }

    /// Buy the next `train_name` from the depot for `buyer` at face value.
    pub fn buy_train(&mut self, buyer: &EntityKey, train_name: &str) -> GameResult<()> {
        self.ensure_running()?;
        let owner = Holder::entity(buyer);
        let ledger = self.state.ledger();
        let train = ledger
            .trains_of(&Holder::Bank)
            .into_iter()
            .find(|train| train.name == train_name)
            .ok_or_else(|| GameError::invalid(format!("no {train_name} train left in the depot")))?;
        if ledger.trains_of(&owner).len() >= ledger.train_limit(buyer) {
            return Err(GameError::invalid(format!("{buyer} is at its train limit")));
        }
        let available = ledger.cash(&owner);
        if available < train.price {
            return Err(GameError::InsufficientFunds {
                required: train.price,
                available,
            });
        }

        let result = self
            .state
            .ledger
            .transfer_train(&Holder::Bank, &owner, &train.id, TrainPrice::Paid(train.price))
            .map_err(GameError::into_fatal);
        self.guard(result)?;
        info!(%buyer, train = %train.name, price = train.price, "train bought");
        self.state.log.push(format!(
            "{buyer} buys a {} train for {}",
            train.name,
            format_currency(train.price)
        ));
        self.train_purchased(train_name)
    }

    /// Record that `entity` ran during the current operating round.
    pub fn record_operation(&mut self, entity: &EntityKey) -> GameResult<()> {
        self.ensure_running()?;
        let turn = self
            .state
            .operating_round()
            .map(|round| round.turn)
            .ok_or_else(|| GameError::invalid("no operating round is running"))?;
        self.state.ledger.record_operation(entity, turn);
        Ok(())
    }

    /// Begin an operating round with the formation and merge steps.
    pub fn start_operating_round(&mut self, turn: OperatingTurn) -> GameResult<()> {
        self.ensure_running()?;
        match self.round.kind() {
            RoundKind::Draft => return Err(GameError::invalid("the draft is still running")),
            RoundKind::Operating(current) if !self.round.is_finished(&self.state) => {
                return Err(GameError::invalid(format!(
                    "operating round {}.{} still waits for {}",
                    current.turn,
                    current.round,
                    self.round
                        .active_step(&self.state)
                        .map(|step| step.description())
                        .unwrap_or("an action")
                )))
            }
            RoundKind::Operating(_) | RoundKind::Stock => {}
        }
        self.state.begin_operating_round(turn);
        self.round = Round::operating(turn);
        info!(turn = turn.turn, round = turn.round, "operating round started");
        self.state
            .log
            .push(format!("-- Operating Round {}.{} --", turn.turn, turn.round));
        Ok(())
    }

    /// Close the operating round; refused while a blocking step waits.
    pub fn finish_operating_round(&mut self) -> GameResult<()> {
        self.ensure_running()?;
        let RoundKind::Operating(turn) = self.round.kind() else {
            return Err(GameError::invalid("no operating round is running"));
        };
        if let Some(step) = self.round.active_step(&self.state) {
            return Err(GameError::invalid(format!(
                "{} is still waiting for {}",
                step.description(),
                step.current_actor(&self.state)
                    .map(|player| self.state.player_name(player))
                    .unwrap_or_else(|| "an action".to_string())
            )));
        }
        self.state.end_operating_round();
        self.round = Round::stock();
        info!(turn = turn.turn, round = turn.round, "operating round finished");
        Ok(())
    }

    /// Pay `per_share` per ordinary share of `corporation` to its holders.
    pub fn pay_dividend(&mut self, corporation: &EntityKey, per_share: i64) -> GameResult<i64> {
        self.ensure_running()?;
        let result = dividend::pay_dividend(&mut self.state, corporation, per_share);
        self.guard(result)
    }

    /// Dividend `player` would receive right now.
    pub fn dividend_for(&self, player: PlayerId, corporation: &EntityKey, per_share: i64) -> GameResult<i64> {
        dividend::dividend_for(&self.state, player, corporation, per_share)
    }

    /// Price `buyer` would pay to nationalize `slot` at market price `price`.
    pub fn nationalization_quote(&self, buyer: PlayerId, slot: &ShareSlot, price: i64) -> GameResult<i64> {
        self.ensure_running()?;
        nationalization::quote(&self.state, buyer, slot, price)
    }

    /// Buy `slot` from another player at the nationalization price.
    pub fn nationalize(&mut self, buyer: PlayerId, slot: &ShareSlot, price: i64) -> GameResult<i64> {
        self.ensure_running()?;
        let result = nationalization::nationalize(&mut self.state, buyer, slot, price);
        self.guard(result)
    }

    fn ensure_running(&self) -> GameResult<()> {
        match &self.halted {
            Some(reason) => Err(GameError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Halt on fatal errors; pass everything else through.
    fn guard<T>(&mut self, result: GameResult<T>) -> GameResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() && self.halted.is_none() {
                error!(%err, "game halted");
                self.halted = Some(err.to_string());
                self.state.log.push(format!("Game halted: {err}"));
            }
        }
        result
    }

    fn advance_finished_draft(&mut self) {
        if self.round.kind() == RoundKind::Draft && self.round.is_finished(&self.state) {
            let unsold = self.state.available();
            if !unsold.is_empty() {
                warn!(unsold = unsold.len(), "draft ended with unsold items");
            }
            self.round = Round::stock();
            self.state.log.push("-- Stock Round --");
            info!("draft finished, stock round begins");
        }
    }
}
