//! Dividend payout honouring shares that merged in after their entity had
//! already operated this round.

use tracing::info;

use crate::{
    catalog::format_currency,
    entity::{EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    state::GameState,
};

/// Dividend `player` receives from `corporation` at `per_share` per ordinary
/// share, floored. The percent of merged certificates that do not pay this
/// round is subtracted first; never negative.
pub fn dividend_for(state: &GameState, player: PlayerId, corporation: &EntityKey, per_share: i64) -> GameResult<i64> {
    let share_percent = i64::from(state.entities.corporation(corporation)?.share_percent());
    if share_percent == 0 {
        return Err(GameError::consistency(format!("{corporation} has a zero-percent share")));
    }
    let owned = i64::from(state.ledger.percent_of(&Holder::Player(player), corporation));
    let excluded = i64::from(state.non_paying_percent(player, corporation));
    let paying = (owned - excluded).max(0);
    Ok((paying * per_share).div_euclid(share_percent))
}

/// Amount owed to every player, in seating order, skipping zero payouts.
pub fn payouts(state: &GameState, corporation: &EntityKey, per_share: i64) -> GameResult<Vec<(PlayerId, i64)>> {
    let mut owed = Vec::new();
    for player in state.players() {
        let amount = dividend_for(state, player.id, corporation, per_share)?;
        if amount > 0 {
            owed.push((player.id, amount));
        }
    }
    Ok(owed)
}

/// Pay every player holder of `corporation` from the bank. Returns the total.
pub fn pay_dividend(state: &mut GameState, corporation: &EntityKey, per_share: i64) -> GameResult<i64> {
    if per_share < 0 {
        return Err(GameError::invalid(format!("negative dividend {per_share} per share")));
    }
    let owed = payouts(state, corporation, per_share)?;
    let total: i64 = owed.iter().map(|(_, amount)| amount).sum();
    let bank = state.ledger.cash(&Holder::Bank);
    if bank < total {
        return Err(GameError::InsufficientFunds {
            required: total,
            available: bank,
        });
    }

    for (player, amount) in &owed {
        state
            .ledger
            .transfer_cash(&Holder::Bank, &Holder::Player(*player), *amount)
            .map_err(GameError::into_fatal)?;
    }
    info!(%corporation, per_share, total, recipients = owed.len(), "dividend paid");
    state.log.push(format!(
        "{corporation} pays {} per share ({} in total)",
        format_currency(per_share),
        format_currency(total)
    ));
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::{OperatingTurn, ShareTransfer},
        shares::ShareSlot,
        step::formation::{FormationController, FormationEvent},
        test_support::{game_state, grant, key, p},
    };

    #[test]
    fn ordinary_holdings_pay_in_full() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "NF")?;
        grant(&mut state, p(0), "OBB")?;
        assert_eq!(dividend_for(&state, p(0), &key("BY"), 17)?, 34);
        assert_eq!(dividend_for(&state, p(1), &key("BY"), 17)?, 0);
        Ok(())
    }

    #[test]
    fn merged_share_of_an_operated_entity_is_excluded() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        grant(&mut state, p(1), "P4")?;
        state.begin_operating_round(OperatingTurn::new(3, 1));
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;
        if let Some(round) = state.operating.as_mut() {
            round.non_paying.exclude(p(1), &key("PR"), 10);
        }
        state.ledger.set_buyable(&ShareSlot::new("PR", 3), true)?;
        state
            .ledger
            .transfer_share(&ShareSlot::new("PR", 3), &Holder::Player(p(1)), ShareTransfer::grant())?;
        state
            .ledger
            .transfer_share(&ShareSlot::new("PR", 4), &Holder::Player(p(1)), ShareTransfer::grant())?;

        assert_eq!(dividend_for(&state, p(1), &key("PR"), 15)?, 15);
        assert_eq!(dividend_for(&state, p(0), &key("PR"), 15)?, 15);
        Ok(())
    }

    #[test]
    fn half_shares_floor_the_payout() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "P2")?;
        FormationController::handle_event(&mut state, FormationEvent::MandatoryFormation)?;
        state.ledger.set_buyable(&ShareSlot::new("PR", 8), true)?;
        state
            .ledger
            .transfer_share(&ShareSlot::new("PR", 8), &Holder::Player(p(2)), ShareTransfer::grant())?;
        assert_eq!(dividend_for(&state, p(2), &key("PR"), 15)?, 7);
        Ok(())
    }

    #[test]
    fn payout_comes_out_of_the_bank() -> GameResult<()> {
        let mut state = game_state(3)?;
        grant(&mut state, p(0), "NF")?;
        grant(&mut state, p(2), "PB")?;
        let bank = state.ledger.cash(&Holder::Bank);

        let total = pay_dividend(&mut state, &key("BY"), 10)?;
        assert_eq!(total, 20);
        assert_eq!(state.cash_of(p(0)), 610);
        assert_eq!(state.cash_of(p(2)), 610);
        assert_eq!(state.ledger.cash(&Holder::Bank), bank - 20);
        assert_eq!(state.log.last(), Some("BY pays 10M per share (20M in total)"));
        Ok(())
    }
}
