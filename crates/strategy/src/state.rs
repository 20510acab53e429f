use serde::Serialize;
use tracing::info;

use common::Decision;

/// Whether the pair currently has capital committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    #[default]
    NoPosition,
    Holding,
}

impl PositionState {
    /// The ledger is the source of truth: any open position means holding.
    pub fn from_open_positions(count: usize) -> Self {
        if count > 0 {
            PositionState::Holding
        } else {
            PositionState::NoPosition
        }
    }

    /// Downgrade decisions that are not actionable from this state to HOLD.
    pub fn gate(self, decision: Decision) -> Decision {
        match (self, decision) {
            (PositionState::NoPosition, Decision::Buy) | (PositionState::Holding, Decision::Sell) => {
                decision
            }
            (_, Decision::Hold) => Decision::Hold,
            (state, rejected) => {
                info!(state = %state, decision = %rejected, "Decision not actionable, holding");
                Decision::Hold
            }
        }
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::NoPosition => write!(f, "NO_POSITION"),
            PositionState::Holding => write!(f, "HOLDING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_only_from_no_position() {
        assert_eq!(PositionState::NoPosition.gate(Decision::Buy), Decision::Buy);
        assert_eq!(PositionState::Holding.gate(Decision::Buy), Decision::Hold);
    }

    #[test]
    fn sell_only_from_holding() {
        assert_eq!(PositionState::Holding.gate(Decision::Sell), Decision::Sell);
        assert_eq!(PositionState::NoPosition.gate(Decision::Sell), Decision::Hold);
    }

    #[test]
    fn hold_passes_through_either_state() {
        assert_eq!(PositionState::NoPosition.gate(Decision::Hold), Decision::Hold);
        assert_eq!(PositionState::Holding.gate(Decision::Hold), Decision::Hold);
    }

    #[test]
    fn derived_from_ledger_size() {
        assert_eq!(PositionState::from_open_positions(0), PositionState::NoPosition);
        assert_eq!(PositionState::from_open_positions(2), PositionState::Holding);
    }
}
