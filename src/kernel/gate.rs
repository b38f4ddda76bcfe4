use serde::{Deserialize, Serialize};
use tracing::info;

use super::regulation::RegulationState;
use super::session::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::config::RegulationConfig;

/// Hysteresis state of the difficulty gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    Unlocked,
    Locked { remaining_turns: u8 },
}

impl GateState {
    pub fn from_remaining(remaining_turns: u8) -> Self {
        if remaining_turns == 0 {
            GateState::Unlocked
        } else {
            GateState::Locked { remaining_turns }
        }
    }
}

/// What the gate decided for this turn, and the state it leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub delta: i8,
    pub next: GateState,
}

/// Decides difficulty deltas. Transitions fire only from `Unlocked`; any
/// change locks for `lock_turns`, and `Locked` counts down one per turn
/// regardless of signals. With the default lock of 2 this allows at most one
/// change in any three consecutive turns.
#[derive(Debug, Clone)]
pub struct DifficultyGate {
    config: RegulationConfig,
}

impl DifficultyGate {
    pub fn new(config: RegulationConfig) -> Self {
        Self { config }
    }

    /// Pure function: (RegulationState) -> GateDecision
    pub fn decide(&self, reg: &RegulationState) -> GateDecision {
        use GateState::*;

        match GateState::from_remaining(reg.locked_turns_remaining) {
            Locked { remaining_turns } => GateDecision {
                delta: 0,
                next: GateState::from_remaining(remaining_turns - 1),
            },
            Unlocked => {
                let confident = reg.mood_confidence >= self.config.decision_confidence;

                let decrease = confident
                    && reg.frustration_streak >= self.config.frustration_turns
                    && reg.current_difficulty > MIN_DIFFICULTY;

                let increase = confident
                    && reg.stability_streak >= self.config.stability_turns
                    && reg.last_outcome_success
                    && reg.current_difficulty < MAX_DIFFICULTY;

                let delta = if decrease {
                    -1
                } else if increase {
                    1
                } else {
                    0
                };

                if delta == 0 {
                    return GateDecision { delta, next: Unlocked };
                }

                info!(
                    "[DifficultyGate] delta {:+} at difficulty {} (frustration={} stability={} conf={:.2})",
                    delta,
                    reg.current_difficulty,
                    reg.frustration_streak,
                    reg.stability_streak,
                    reg.mood_confidence
                );
                GateDecision {
                    delta,
                    next: GateState::from_remaining(self.config.lock_turns),
                }
            }
        }
    }
}
