//! Draft of the start packet: players buy items at fixed prices in seating
//! order until the packet is sold out or everybody passes in a row.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    action::{Action, ActionKind},
    catalog::format_currency,
    entity::{DraftKind, EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    ledger::{Ledger, ShareTransfer},
    shares::ShareSlot,
    state::GameState,
    step::Step,
};

/// Lifecycle of the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    /// Players are still buying.
    Active,
    /// Packet sold out or a full pass cycle happened.
    Finished,
}

/// Turn loop over the auction grid.
#[derive(Debug, Clone)]
pub struct DraftAllocator {
    order: Vec<PlayerId>,
    current: usize,
    passed: Vec<bool>,
    status: DraftStatus,
}

impl DraftAllocator {
    /// Draft with players acting in `order`.
    pub fn new(order: Vec<PlayerId>) -> Self {
        let passed = vec![false; order.len()];
        let status = if order.is_empty() {
            DraftStatus::Finished
        } else {
            DraftStatus::Active
        };
        Self {
            order,
            current: 0,
            passed,
            status,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> DraftStatus {
        self.status
    }

    /// Whether no more actions are accepted.
    pub fn is_finished(&self) -> bool {
        self.status == DraftStatus::Finished
    }

    /// Player whose turn it is; `None` once finished.
    pub fn current_player(&self) -> Option<PlayerId> {
        match self.status {
            DraftStatus::Active => self.order.get(self.current).copied(),
            DraftStatus::Finished => None,
        }
    }

    /// Whether `player` passed since the last purchase.
    pub fn has_passed(&self, player: PlayerId) -> bool {
        self.order
            .iter()
            .position(|seat| *seat == player)
            .map(|index| self.passed[index])
            .unwrap_or(false)
    }

    /// Whether `player` can pay for at least one item on offer.
    pub fn can_afford_any(state: &GameState, player: PlayerId) -> bool {
        let cash = state.cash_of(player);
        state.available().iter().any(|key| {
            state
                .entities
                .item(key)
                .map(|item| item.min_bid() <= cash)
                .unwrap_or(false)
        })
    }

    /// Pass for every player in turn who cannot afford anything on offer.
    pub fn skip_unaffordable(&mut self, state: &mut GameState) {
        self.refresh(state);
        while let Some(player) = self.current_player() {
            if Self::can_afford_any(state, player) {
                break;
            }
            let message = format!("{} has no valid actions and passes", state.player_name(player));
            info!(player = %player, "draft auto-pass");
            state.log.push(message);
            self.mark_passed_and_advance();
            self.refresh(state);
        }
    }

    fn refresh(&mut self, state: &GameState) {
        if self.status == DraftStatus::Finished {
            return;
        }
        if state.grid.is_exhausted_in(&state.entities) || self.passed.iter().all(|passed| *passed) {
            self.status = DraftStatus::Finished;
            info!(unsold = state.available().len(), "draft finished");
        }
    }

    fn advance(&mut self) {
        if !self.order.is_empty() {
            self.current = (self.current + 1) % self.order.len();
        }
    }

    fn mark_passed_and_advance(&mut self) {
        self.passed[self.current] = true;
        self.advance();
    }

    fn ensure_turn(&self, state: &GameState, actor: PlayerId) -> GameResult<()> {
        match self.current_player() {
            None => Err(GameError::invalid("the draft is finished")),
            Some(current) if current != actor => Err(GameError::invalid(format!(
                "it is {}'s turn, not {}'s",
                state.player_name(current),
                state.player_name(actor)
            ))),
            Some(_) => Ok(()),
        }
    }

    fn bid(&mut self, state: &mut GameState, actor: PlayerId, key: &EntityKey, price: i64) -> GameResult<()> {
        self.ensure_turn(state, actor)?;
        let min_bid = state.entities.item(key)?.min_bid();
        if !state.available().contains(key) {
            return Err(GameError::invalid(format!("{key} is not available")));
        }
        if price < min_bid {
            return Err(GameError::invalid(format!(
                "{key} costs at least {}, bid was {}",
                format_currency(min_bid),
                format_currency(price)
            )));
        }
        let available = state.cash_of(actor);
        if available < price {
            return Err(GameError::InsufficientFunds {
                required: price,
                available,
            });
        }

        purchase(state, actor, key, price)?;
        self.passed.iter_mut().for_each(|passed| *passed = false);
        self.advance();
        Ok(())
    }

    fn pass(&mut self, state: &mut GameState, actor: PlayerId) -> GameResult<()> {
        self.ensure_turn(state, actor)?;
        state.log.push(format!("{} passes", state.player_name(actor)));
        debug!(player = %actor, "draft pass");
        self.mark_passed_and_advance();
        Ok(())
    }
}

impl Step for DraftAllocator {
    fn description(&self) -> &'static str {
        "Draft Private Companies and minors"
    }

    fn is_active(&self, _state: &GameState) -> bool {
        !self.is_finished()
    }

    fn current_actor(&self, _state: &GameState) -> Option<PlayerId> {
        self.current_player()
    }

    fn actions(&self, _state: &GameState, actor: PlayerId) -> Vec<ActionKind> {
        if self.current_player() == Some(actor) {
            vec![ActionKind::Bid, ActionKind::Pass]
        } else {
            Vec::new()
        }
    }

    fn process(&mut self, state: &mut GameState, action: &Action) -> GameResult<()> {
        match action {
            Action::Bid { entity, item, price } => self.bid(state, *entity, item, *price)?,
            Action::Pass { entity } => self.pass(state, *entity)?,
            Action::Choose { .. } => return Err(GameError::invalid("nothing to choose during the draft")),
        }
        self.skip_unaffordable(state);
        Ok(())
    }
}

/// Hand `key` to `player` for `price`, together with whatever comes with it.
///
/// Callers validate turn order, availability and cash first. Ledger failures
/// past that point are fatal.
pub(crate) fn purchase(state: &mut GameState, player: PlayerId, key: &EntityKey, price: i64) -> GameResult<()> {
    let item = state.entities.item(key)?;
    if item.is_owned() {
        return Err(GameError::consistency(format!("{key} was sold twice")));
    }
    let granted_slot = match &item.kind {
        DraftKind::Private(company) => company.bundled_share.clone(),
        DraftKind::Major(major) => Some(ShareSlot::director(major.sym.clone())),
        DraftKind::Minor(_) => None,
    };
    if let Some(slot) = &granted_slot {
        match state.ledger.share(slot) {
            Some(info) if info.holder == Holder::Bank => {}
            Some(info) => {
                return Err(GameError::consistency(format!("{slot} is already held by {}", info.holder)))
            }
            None => return Err(GameError::consistency(format!("missing share slot {slot}"))),
        }
    }
    let home = item.home().map(str::to_string);
    let name = item.name().to_string();

    settle_purchase(state.ledger.as_mut(), player, key, price, granted_slot.as_ref(), home.as_deref())
        .map_err(GameError::into_fatal)?;

    state.entities.item_mut(key)?.assign_owner(player)?;
    let buyer = state.player_name(player);
    info!(player = %buyer, item = %key, price, "item drafted");
    state
        .log
        .push(format!("{buyer} buys {name} for {}", format_currency(price)));
    if let Some(slot) = granted_slot {
        state.log.push(format!("{buyer} receives the {slot} share"));
    }
    Ok(())
}

fn settle_purchase(
    ledger: &mut dyn Ledger,
    player: PlayerId,
    key: &EntityKey,
    price: i64,
    granted_slot: Option<&ShareSlot>,
    home: Option<&str>,
) -> GameResult<()> {
    let holder = Holder::Player(player);
    ledger.transfer_cash(&holder, &Holder::Bank, price)?;
    if let Some(slot) = granted_slot {
        ledger.set_buyable(slot, true)?;
        ledger.transfer_share(slot, &holder, ShareTransfer::grant())?;
    }
    if let Some(home) = home {
        ledger.place_token(home, key)?;
    }
    Ok(())
}
