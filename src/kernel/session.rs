use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::mood::Mood;
use crate::config::RegulationConfig;
use crate::error::{EngineError, UpdatePhase};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;
pub const MAX_STORED_TEXT: usize = 200;

pub type SessionId = Uuid;

/// Result of a finished turn, as judged from the structural check of the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    /// Waiting for `pre_decision`.
    Idle,
    /// `pre_decision` ran; waiting for `post_response`.
    Decided,
}

/// The mutable part of a session. Cloned as the pre-turn checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionRecord {
    current_concept: String,
    current_difficulty: u8,
    consecutive_frustration: u32,
    consecutive_stability: u32,
    difficulty_locked_turns: u8,
    turn_count: u32,
    mood: Mood,
    mood_confidence: f32,
    last_user_input: String,
    last_response: String,
    last_outcome: Option<TurnOutcome>,
}

/// Per-session working state (memory layer 4).
///
/// Mutated only through the two update phases, in order:
/// `pre_decision` before any gate/strategy logic, `post_response` after the
/// renderer replied. A misordered call discards the turn and restores the
/// snapshot taken when the turn began.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: SessionId,
    config: RegulationConfig,
    record: SessionRecord,
    phase: TurnPhase,
    checkpoint: Option<SessionRecord>,
}

impl SessionState {
    pub fn new(concept: impl Into<String>, difficulty: u8, config: RegulationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            record: SessionRecord {
                current_concept: concept.into(),
                current_difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
                consecutive_frustration: 0,
                consecutive_stability: 0,
                difficulty_locked_turns: 0,
                turn_count: 0,
                mood: Mood::Neutral,
                mood_confidence: 0.0,
                last_user_input: String::new(),
                last_response: String::new(),
                last_outcome: None,
            },
            phase: TurnPhase::Idle,
            checkpoint: None,
        }
    }

    // --- Read-only accessors ---

    pub fn id(&self) -> SessionId {
        self.id
    }
    pub fn current_concept(&self) -> &str {
        &self.record.current_concept
    }
    pub fn current_difficulty(&self) -> u8 {
        self.record.current_difficulty
    }
    pub fn consecutive_frustration(&self) -> u32 {
        self.record.consecutive_frustration
    }
    pub fn consecutive_stability(&self) -> u32 {
        self.record.consecutive_stability
    }
    pub fn difficulty_locked_turns(&self) -> u8 {
        self.record.difficulty_locked_turns
    }
    pub fn turn_count(&self) -> u32 {
        self.record.turn_count
    }
    pub fn mood(&self) -> Mood {
        self.record.mood
    }
    pub fn mood_confidence(&self) -> f32 {
        self.record.mood_confidence
    }
    pub fn last_user_input(&self) -> &str {
        &self.record.last_user_input
    }
    pub fn last_response(&self) -> &str {
        &self.record.last_response
    }
    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.record.last_outcome
    }
    pub fn is_decided(&self) -> bool {
        self.phase == TurnPhase::Decided
    }

    /// Phase 1: fresh mood and streaks, before any decision is made.
    pub fn pre_decision(&mut self, mood: Mood, confidence: f32) -> Result<(), EngineError> {
        if self.phase == TurnPhase::Decided {
            self.rollback(UpdatePhase::PreDecision);
            return Err(EngineError::InvalidOrdering {
                called: UpdatePhase::PreDecision,
            });
        }

        self.checkpoint = Some(self.record.clone());
        self.phase = TurnPhase::Decided;

        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        self.record.mood = mood;
        self.record.mood_confidence = confidence;
        self.update_streaks(mood, confidence);

        info!(
            "[Session {}] Pre-decision | mood={} ({:.2}) frustration={} stability={}",
            self.id,
            mood.name(),
            confidence,
            self.record.consecutive_frustration,
            self.record.consecutive_stability
        );
        Ok(())
    }

    /// Phase 2: finalize the turn once the reply exists.
    ///
    /// A non-zero `difficulty_delta` while locked violates the lock invariant
    /// and is refused like an ordering error.
    pub fn post_response(
        &mut self,
        difficulty_delta: i8,
        turn_outcome: TurnOutcome,
        user_input: &str,
        response: &str,
    ) -> Result<(), EngineError> {
        if self.phase != TurnPhase::Decided {
            self.rollback(UpdatePhase::PostResponse);
            return Err(EngineError::InvalidOrdering {
                called: UpdatePhase::PostResponse,
            });
        }

        if difficulty_delta != 0 && self.record.difficulty_locked_turns > 0 {
            let remaining = self.record.difficulty_locked_turns;
            self.rollback(UpdatePhase::PostResponse);
            return Err(EngineError::DifficultyLocked { remaining });
        }

        let old = self.record.current_difficulty;
        let new = (old as i16 + difficulty_delta.signum() as i16)
            .clamp(MIN_DIFFICULTY as i16, MAX_DIFFICULTY as i16) as u8;

        if new != old {
            self.record.current_difficulty = new;
            self.record.difficulty_locked_turns = self.config.lock_turns;
            self.record.consecutive_frustration = 0;
            self.record.consecutive_stability = 0;
            info!(
                "[Session {}] Difficulty changed: {} -> {} (locked for {} turns)",
                self.id, old, new, self.config.lock_turns
            );
        } else {
            // The lock counts down every turn, whatever the signals say.
            self.record.difficulty_locked_turns =
                self.record.difficulty_locked_turns.saturating_sub(1);
        }

        self.record.turn_count += 1;
        self.record.last_outcome = Some(turn_outcome);
        self.record.last_user_input = truncate_chars(user_input, MAX_STORED_TEXT);
        self.record.last_response = truncate_chars(response, MAX_STORED_TEXT);

        self.checkpoint = None;
        self.phase = TurnPhase::Idle;

        info!(
            "[Session {}] Turn {} complete | difficulty={} locked={}",
            self.id,
            self.record.turn_count,
            self.record.current_difficulty,
            self.record.difficulty_locked_turns > 0
        );
        Ok(())
    }

    /// Throw away an in-flight turn (renderer failure, interrupt before commit).
    pub fn abort_turn(&mut self) {
        if let Some(snapshot) = self.checkpoint.take() {
            self.record = snapshot;
        }
        self.phase = TurnPhase::Idle;
    }

    pub fn set_concept(&mut self, concept: impl Into<String>) {
        self.record.current_concept = concept.into();
    }

    fn rollback(&mut self, called: UpdatePhase) {
        warn!(
            "[Session {}] Invalid ordering ({}); turn discarded, state restored",
            self.id, called
        );
        self.abort_turn();
    }

    fn update_streaks(&mut self, mood: Mood, confidence: f32) {
        if confidence < self.config.decision_confidence {
            // Weak readings never move the streaks.
            return;
        }
        if mood.is_distressed() {
            self.record.consecutive_frustration += 1;
            self.record.consecutive_stability = 0;
        } else if mood.is_stable() {
            self.record.consecutive_stability += 1;
            self.record.consecutive_frustration = 0;
        } else {
            // Anxious / quiet: do not escalate uncertainty either way.
            self.record.consecutive_frustration = 0;
            self.record.consecutive_stability = 0;
        }
    }
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
