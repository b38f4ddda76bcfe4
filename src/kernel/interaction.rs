use serde::{Deserialize, Serialize};

use crate::config::InteractionConfig;

/// Lifecycle of the device around the decision core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionState {
    /// Waiting for the wake word. Nothing is processed.
    Resting,
    /// Accepting utterances; every transcript becomes a turn.
    Listening,
    /// A reply is playing; only interrupts and the sleep word are honoured.
    Speaking,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::Resting
    }
}

/// Requests for a transition. The state machine may ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionEvent {
    WakeWord,
    TurnRendered,
    PlaybackFinished,
    InterruptConfirmed,
    SleepWord,
}

pub struct InteractionStateMachine;

impl InteractionStateMachine {
    /// Pure function: (Current State, Event) -> New State
    /// Returns None if the transition is invalid/ignored.
    pub fn transition(current: InteractionState, event: InteractionEvent) -> Option<InteractionState> {
        use InteractionEvent::*;
        use InteractionState::*;

        match (current, event) {
            (Resting, WakeWord) => Some(Listening),

            (Listening, TurnRendered) => Some(Speaking),
            (Listening, SleepWord) => Some(Resting),

            (Speaking, PlaybackFinished) => Some(Listening),
            (Speaking, InterruptConfirmed) => Some(Listening),
            (Speaking, SleepWord) => Some(Resting),

            _ => None,
        }
    }
}

/// Control words recognized in a transcript before it reaches the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Wake,
    Sleep,
    Interrupt,
}

/// Whole-word, case-insensitive match. Sleep beats interrupt beats wake.
pub fn detect_control_word(transcript: &str, config: &InteractionConfig) -> Option<ControlWord> {
    let words: Vec<String> = transcript
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let has = |needle: &str| words.iter().any(|w| w.eq_ignore_ascii_case(needle));

    if has(&config.sleep_word) {
        Some(ControlWord::Sleep)
    } else if config.interrupt_keywords.iter().any(|k| has(k)) {
        Some(ControlWord::Interrupt)
    } else if has(&config.wake_word) {
        Some(ControlWord::Wake)
    } else {
        None
    }
}
