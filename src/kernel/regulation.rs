use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mood::Mood;
use super::session::{SessionState, TurnOutcome};

/// Normalized regulation signals derived from `SessionState`.
///
/// Recomputed every turn and never mutated in place. Everything downstream
/// of the session (gate, strategy, reinforcement) reads this, never the
/// session or raw mood readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulationState {
    pub frustration_persistence: f32, // 0.0 - 1.0
    pub stability_persistence: f32,   // 0.0 - 1.0
    pub emotional_trend_score: f32,   // -1.0 - 1.0
    pub current_difficulty: u8,
    pub difficulty_locked: bool,

    // Pass-through context for the gate and strategy lookup.
    pub mood: Mood,
    pub mood_confidence: f32,
    pub frustration_streak: u32,
    pub stability_streak: u32,
    pub locked_turns_remaining: u8,
    pub last_outcome_success: bool,
    pub turn_count: u32,
}

impl RegulationState {
    /// Pure projection of the session. Identical input, identical output.
    pub fn compute(session: &SessionState, max_streak: u32) -> Self {
        let max = max_streak.max(1) as f32;
        let frustration_persistence = (session.consecutive_frustration() as f32 / max).min(1.0);
        let stability_persistence = (session.consecutive_stability() as f32 / max).min(1.0);
        let emotional_trend_score = stability_persistence - frustration_persistence;

        debug!(
            "[Regulation] frustration={:.2} stability={:.2} trend={:.2}",
            frustration_persistence, stability_persistence, emotional_trend_score
        );

        Self {
            frustration_persistence,
            stability_persistence,
            emotional_trend_score,
            current_difficulty: session.current_difficulty(),
            difficulty_locked: session.difficulty_locked_turns() > 0,
            mood: session.mood(),
            mood_confidence: session.mood_confidence(),
            frustration_streak: session.consecutive_frustration(),
            stability_streak: session.consecutive_stability(),
            locked_turns_remaining: session.difficulty_locked_turns(),
            last_outcome_success: session.last_outcome() == Some(TurnOutcome::Success),
            turn_count: session.turn_count(),
        }
    }

    /// No frustration pressure and not trending down.
    pub fn is_calm(&self) -> bool {
        self.frustration_streak == 0 && self.emotional_trend_score >= 0.0 && !self.difficulty_locked
    }
}
