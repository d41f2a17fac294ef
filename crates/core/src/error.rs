//! Error types shared by every rules step.

use thiserror::Error;

/// Result alias used throughout the rules core.
pub type GameResult<T> = Result<T, GameError>;

/// Reasons an action or collaborator call can be rejected.
///
/// Everything except [`GameError::Consistency`] and [`GameError::Halted`] is
/// recoverable: the action is refused and the game state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Actor or state mismatch, e.g. acting out of turn or naming an item that
    /// is not on offer.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// The actor cannot cover the required amount.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount the action needs.
        required: i64,
        /// Cash the actor holds.
        available: i64,
    },
    /// Attempt to decline a step that can no longer be declined.
    #[error("{0} is mandatory")]
    MandatoryAction(String),
    /// Setup or data bug: an unknown key, a missing or already-issued share
    /// slot, or a collaborator refusing an already validated change.
    #[error("consistency error: {0}")]
    Consistency(String),
    /// The session stopped after an earlier fatal error.
    #[error("game halted: {0}")]
    Halted(String),
}

impl GameError {
    /// Shorthand for [`GameError::InvalidAction`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidAction(message.into())
    }

    /// Shorthand for [`GameError::Consistency`].
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    /// Whether the session must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::Halted(_))
    }

    /// Whether the action can simply be retried with different input.
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Promote an error raised after validation into a fatal one.
    ///
    /// Used when applying effects: every check already passed, so a collaborator
    /// refusing the change means the ledger and the core disagree.
    pub fn into_fatal(self) -> Self {
        match self {
            Self::Consistency(_) | Self::Halted(_) => self,
            other => Self::Consistency(format!("ledger rejected a validated change: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_stay_recoverable() {
        assert!(GameError::invalid("out of turn").is_recoverable());
        assert!(GameError::MandatoryAction("merging".into()).is_recoverable());
        assert!(GameError::InsufficientFunds {
            required: 100,
            available: 20
        }
        .is_recoverable());
        assert!(GameError::consistency("missing PR_12").is_fatal());
    }

    #[test]
    fn into_fatal_wraps_recoverable_errors() {
        let err = GameError::InsufficientFunds {
            required: 10,
            available: 0,
        }
        .into_fatal();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("required 10"));

        let already = GameError::consistency("x");
        assert_eq!(already.clone().into_fatal(), already);
    }
}
