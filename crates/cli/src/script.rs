//! Scripted sessions: a JSON list of player actions and collaborator events
//! replayed against a [`Game`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use g1835_core::{Action, EntityKey, Game, OperatingTurn};

/// A whole session script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Stop at the first rejected step instead of logging and moving on.
    #[serde(default)]
    pub strict: bool,
    pub steps: Vec<ScriptStep>,
}

/// One entry of a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// A player action.
    Action { action: Action },
    /// The host's train subsystem sold a train from the depot.
    BuyTrain { entity: EntityKey, train: String },
    /// A train was bought elsewhere; only fires formation events.
    TrainPurchased { train: String },
    OperatingRound { turn: u32, round: u32 },
    /// An entity ran during the current operating round.
    Operated { entity: EntityKey },
    FinishOperatingRound,
    Dividend { corporation: EntityKey, per_share: i64 },
}

impl Script {
    /// Run every step in order. Rejected steps are logged and skipped unless
    /// the script is strict; a halted game always ends the replay.
    pub fn replay(&self, game: &mut Game) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            match step.apply(game) {
                Ok(()) => {}
                Err(err) if self.strict || game.is_halted() => {
                    return Err(err).with_context(|| format!("script step {number} failed"));
                }
                Err(err) => warn!(step = number, %err, "script step rejected"),
            }
        }
        info!(steps = self.steps.len(), "script finished");
        Ok(())
    }
}

impl ScriptStep {
    fn apply(&self, game: &mut Game) -> Result<()> {
        match self {
            Self::Action { action } => game.process(action)?,
            Self::BuyTrain { entity, train } => game.buy_train(entity, train)?,
            Self::TrainPurchased { train } => game.train_purchased(train)?,
            Self::OperatingRound { turn, round } => game.start_operating_round(OperatingTurn::new(*turn, *round))?,
            Self::Operated { entity } => game.record_operation(entity)?,
            Self::FinishOperatingRound => game.finish_operating_round()?,
            Self::Dividend {
                corporation,
                per_share,
            } => {
                game.pay_dividend(corporation, *per_share)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use g1835_core::{GameConfig, PlayerId};

    fn config() -> GameConfig {
        GameConfig {
            players: vec!["Ada".into(), "Bo".into(), "Cy".into()],
            reverse_draft_order: false,
            ..GameConfig::default()
        }
    }

    #[test]
    fn parses_tagged_steps() -> Result<()> {
        let raw = r#"{
            "steps": [
                {"step": "action", "action": {"type": "bid", "entity": 0, "item": "NF", "price": 100}},
                {"step": "train_purchased", "train": "4"},
                {"step": "operating_round", "turn": 1, "round": 1},
                {"step": "finish_operating_round"}
            ]
        }"#;
        let script: Script = serde_json::from_str(raw)?;
        assert!(!script.strict);
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(
            &script.steps[0],
            ScriptStep::Action { action: Action::Bid { entity: PlayerId(0), price: 100, .. } }
        ));
        Ok(())
    }

    #[test]
    fn lenient_replay_skips_rejected_steps() -> Result<()> {
        let mut game = Game::in_memory(&config())?;
        let script = Script {
            strict: false,
            steps: vec![
                ScriptStep::Action {
                    action: Action::Pass { entity: PlayerId(1) },
                },
                ScriptStep::Action {
                    action: Action::Pass { entity: PlayerId(0) },
                },
            ],
        };
        script.replay(&mut game)?;
        assert_eq!(game.current_actor(), Some(PlayerId(1)));
        Ok(())
    }

    #[test]
    fn strict_replay_stops_at_the_first_rejection() -> Result<()> {
        let mut game = Game::in_memory(&config())?;
        let script = Script {
            strict: true,
            steps: vec![ScriptStep::FinishOperatingRound],
        };
        assert!(script.replay(&mut game).is_err());
        Ok(())
    }
}
