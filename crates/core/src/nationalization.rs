//! Player-to-player share purchases for holders above the nationalization
//! threshold.

use tracing::info;

use crate::{
    catalog::format_currency,
    entity::{EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    ledger::ShareTransfer,
    shares::ShareSlot,
    state::GameState,
};

/// Minimum holding, in percent, to buy shares from other players.
pub const NATIONALIZATION_THRESHOLD: u32 = 55;

/// 150% of `price`, rounded up.
pub fn nationalization_price(price: i64) -> i64 {
    (price * 3 + 1).div_euclid(2)
}

/// Whether `player` holds enough of `corporation` to nationalize shares.
pub fn can_nationalize(state: &GameState, player: PlayerId, corporation: &EntityKey) -> bool {
    state.ledger.percent_of(&Holder::Player(player), corporation) >= NATIONALIZATION_THRESHOLD
}

/// Price `buyer` would pay for `slot` at market price `price`.
pub fn quote(state: &GameState, buyer: PlayerId, slot: &ShareSlot, price: i64) -> GameResult<i64> {
    state.player(buyer)?;
    let info = state
        .ledger
        .share(slot)
        .ok_or_else(|| GameError::consistency(format!("missing share slot {slot}")))?;
    match info.holder {
        Holder::Player(owner) if owner != buyer => {}
        _ => return Err(GameError::invalid(format!("{slot} is not held by another player"))),
    }
    if !can_nationalize(state, buyer, &slot.corporation) {
        return Err(GameError::invalid(format!(
            "{} needs {NATIONALIZATION_THRESHOLD}% of {} to nationalize",
            state.player_name(buyer),
            slot.corporation
        )));
    }
    let total = nationalization_price(price);
    let available = state.cash_of(buyer);
    if available < total {
        return Err(GameError::InsufficientFunds {
            required: total,
            available,
        });
    }
    Ok(total)
}

/// Buy `slot` from its holder at 150% of `price`.
pub fn nationalize(state: &mut GameState, buyer: PlayerId, slot: &ShareSlot, price: i64) -> GameResult<i64> {
    let total = quote(state, buyer, slot, price)?;
    let previous = match state.ledger.share(slot).map(|info| info.holder) {
        Some(Holder::Player(owner)) => owner,
        _ => return Err(GameError::consistency(format!("{slot} changed hands during validation"))),
    };
    let percent = state.ledger.share(slot).map(|info| info.percent).unwrap_or_default();

    let transfer = ShareTransfer {
        allow_president_change: true,
        price: Some(total),
    };
    state
        .ledger
        .transfer_share(slot, &Holder::Player(buyer), transfer)
        .map_err(GameError::into_fatal)?;

    let corporation = state
        .entities
        .corporation(&slot.corporation)
        .map(|corporation| corporation.name.clone())
        .unwrap_or_else(|_| slot.corporation.to_string());
    info!(buyer = %buyer, seller = %previous, %slot, total, "share nationalized");
    state.log.push(format!(
        "-- Nationalization: {} buys a {percent}% share of {corporation} from {} for {} --",
        state.player_name(buyer),
        state.player_name(previous),
        format_currency(total)
    ));
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{game_state, grant, key, p};

    fn give(state: &mut GameState, player: usize, indices: &[usize]) -> GameResult<()> {
        for index in indices {
            state
                .ledger
                .transfer_share(&ShareSlot::new("BY", *index), &Holder::Player(p(player)), ShareTransfer::grant())?;
        }
        Ok(())
    }

    #[test]
    fn price_rounds_up() {
        assert_eq!(nationalization_price(92), 138);
        assert_eq!(nationalization_price(75), 113);
        assert_eq!(nationalization_price(0), 0);
    }

    #[test]
    fn threshold_gates_the_purchase() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "BY")?;
        grant(&mut state, p(1), "NF")?;
        give(&mut state, 0, &[4, 5])?;

        let slot = ShareSlot::new("BY", 2);
        let err = quote(&state, p(0), &slot, 92).expect_err("only 40%");
        assert!(matches!(err, GameError::InvalidAction(_)));

        give(&mut state, 0, &[6, 7])?;
        assert!(can_nationalize(&state, p(0), &key("BY")));
        assert_eq!(quote(&state, p(0), &slot, 92)?, 138);
        Ok(())
    }

    #[test]
    fn nationalization_pays_the_seller() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "BY")?;
        grant(&mut state, p(1), "NF")?;
        give(&mut state, 0, &[4, 5, 6, 7])?;

        let total = nationalize(&mut state, p(0), &ShareSlot::new("BY", 2), 92)?;
        assert_eq!(total, 138);
        assert_eq!(state.cash_of(p(0)), 600 - 138);
        assert_eq!(state.cash_of(p(1)), 600 + 138);
        assert_eq!(state.ledger.percent_of(&Holder::Player(p(0)), &key("BY")), 70);
        assert!(state
            .log
            .last()
            .is_some_and(|line| line.starts_with("-- Nationalization: Ada buys a 10% share")));
        Ok(())
    }

    #[test]
    fn ipo_shares_cannot_be_nationalized() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "BY")?;
        give(&mut state, 0, &[4, 5, 6, 7])?;
        let err = quote(&state, p(0), &ShareSlot::new("BY", 8), 92).expect_err("bank share");
        assert!(err.is_recoverable());
        Ok(())
    }
}
