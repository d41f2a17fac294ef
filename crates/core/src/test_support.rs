//! Fixtures shared by the unit tests.

use crate::{
    catalog::Catalog,
    entity::{EntityKey, PlayerId},
    error::GameResult,
    ledger::MemoryLedger,
    state::GameState,
    step::draft,
};

const NAMES: [&str; 7] = ["Ada", "Bo", "Cy", "Di", "Ed", "Flo", "Gus"];

pub(crate) fn p(index: usize) -> PlayerId {
    PlayerId(index)
}

pub(crate) fn key(raw: &str) -> EntityKey {
    EntityKey::from(raw)
}

/// 1835 state for `players` seats with the table's starting cash.
pub(crate) fn game_state(players: usize) -> GameResult<GameState> {
    let catalog = Catalog::g1835();
    let cash = catalog.starting_cash_for(players).unwrap_or(600);
    let names = NAMES.iter().take(players).map(|name| name.to_string()).collect();
    GameState::new(names, &catalog, Box::new(MemoryLedger::from_catalog(&catalog)), cash)
}

/// Give `item` to `player` for free, with everything a purchase brings along.
pub(crate) fn grant(state: &mut GameState, player: PlayerId, item: &str) -> GameResult<()> {
    draft::purchase(state, player, &key(item), 0)
}
