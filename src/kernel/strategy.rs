use serde::Serialize;
use tracing::info;

use super::gate::GateDecision;
use super::mood::Mood;
use super::regulation::RegulationState;
use crate::config::StrategyConfig;

/// Bumped whenever a table entry changes. Logged with every selection so a
/// behaviour can be traced back to the exact table that produced it.
pub const STRATEGY_TABLE_VERSION: u32 = 1;

/// Behavioural parameters for one turn. Selected, never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStrategy {
    /// Max sentences (1-3, never 0).
    pub response_length_limit: u8,
    /// 1 = simple, 2 = normal, 3 = detailed.
    pub instruction_depth: u8,
    /// Speech synthesis speed; lower is slower.
    pub tts_length_scale: f32,
    /// 0 = none .. 3 = high.
    pub reassurance_level: u8,
    /// -1 = easier, 0 = unchanged. Never positive, never below -1.
    pub task_difficulty_modifier: i8,
    /// Renderer instruction; never spoken.
    pub prompt_addition: &'static str,
    pub label: &'static str,
}

/// A table row. `permits_easing` marks moods under which a gate decrease
/// may be forwarded as a task modifier.
#[derive(Debug, Clone, Copy)]
struct StrategyEntry {
    response_length_limit: u8,
    instruction_depth: u8,
    tts_length_scale: f32,
    reassurance_level: u8,
    permits_easing: bool,
    prompt_addition: &'static str,
    label: &'static str,
}

impl StrategyEntry {
    fn build(&self, task_difficulty_modifier: i8) -> RecoveryStrategy {
        RecoveryStrategy {
            response_length_limit: self.response_length_limit,
            instruction_depth: self.instruction_depth,
            tts_length_scale: self.tts_length_scale,
            reassurance_level: self.reassurance_level,
            task_difficulty_modifier,
            prompt_addition: self.prompt_addition,
            label: self.label,
        }
    }
}

const NEUTRAL: StrategyEntry = StrategyEntry {
    response_length_limit: 3,
    instruction_depth: 2,
    tts_length_scale: 0.9,
    reassurance_level: 0,
    permits_easing: false,
    prompt_addition: "",
    label: "neutral",
};

fn full_entry(mood: Mood) -> StrategyEntry {
    match mood {
        Mood::Neutral => NEUTRAL,
        Mood::Happy => StrategyEntry {
            response_length_limit: 3,
            instruction_depth: 2,
            tts_length_scale: 0.9,
            reassurance_level: 0,
            permits_easing: false,
            prompt_addition: "The child seems engaged and positive. Mirror their energy gently. \
                Encourage them. Keep the current task and pace.",
            label: "happy",
        },
        Mood::Frustrated => StrategyEntry {
            response_length_limit: 2,
            instruction_depth: 1,
            tts_length_scale: 0.8,
            reassurance_level: 2,
            permits_easing: true,
            prompt_addition: "The child seems to be finding things difficult. Break instructions \
                into smaller, simpler steps. Add reassurance: 'You are doing well. Let us take it \
                one step at a time.' Do NOT add new tasks. Do NOT increase complexity.",
            label: "frustrated",
        },
        Mood::Anxious => StrategyEntry {
            response_length_limit: 2,
            instruction_depth: 1,
            tts_length_scale: 0.78,
            reassurance_level: 3,
            permits_easing: false,
            prompt_addition: "The child may be feeling uncertain or overwhelmed. Use short, \
                predictable sentences. Add a grounding phrase: 'You are safe. I am right here \
                with you.' Do NOT introduce anything new. Keep things simple and familiar.",
            label: "anxious",
        },
        Mood::Sad => StrategyEntry {
            response_length_limit: 2,
            instruction_depth: 1,
            tts_length_scale: 0.78,
            reassurance_level: 3,
            permits_easing: true,
            prompt_addition: "The child seems to need comfort. Validate their feeling: 'It is \
                okay to feel that way.' Offer an optional pause: 'We can take a break whenever \
                you want.' Do NOT push new tasks. Focus on emotional presence.",
            label: "sad",
        },
        Mood::Quiet => StrategyEntry {
            response_length_limit: 2,
            instruction_depth: 1,
            tts_length_scale: 0.85,
            reassurance_level: 1,
            permits_easing: false,
            prompt_addition: "The child is quiet. Do NOT push them to engage. Offer gentle \
                re-engagement: 'I am here whenever you want to talk.' Keep any task simple. \
                Do NOT escalate.",
            label: "quiet",
        },
    }
}

// Low-confidence rows only touch tone and pacing.
fn tone(
    tts_length_scale: f32,
    reassurance_level: u8,
    prompt_addition: &'static str,
    label: &'static str,
) -> StrategyEntry {
    StrategyEntry {
        response_length_limit: 3,
        instruction_depth: 2,
        tts_length_scale,
        reassurance_level,
        permits_easing: false,
        prompt_addition,
        label,
    }
}

fn low_confidence_entry(mood: Mood) -> StrategyEntry {
    match mood {
        Mood::Neutral => NEUTRAL,
        Mood::Happy => tone(0.9, 0, "Maintain a warm, encouraging tone.", "happy_low_conf"),
        Mood::Frustrated => tone(
            0.85,
            1,
            "Use a patient, calm tone. Add light encouragement.",
            "frustrated_low_conf",
        ),
        Mood::Anxious => tone(
            0.85,
            1,
            "Use a calm, steady tone. Keep sentences short.",
            "anxious_low_conf",
        ),
        Mood::Sad => tone(0.85, 1, "Be gentle and warm. No pressure.", "sad_low_conf"),
        Mood::Quiet => StrategyEntry {
            response_length_limit: 2,
            ..tone(0.9, 0, "", "quiet_low_conf")
        },
    }
}

/// Maps (mood, confidence tier) from the regulation state to a strategy.
#[derive(Debug, Clone)]
pub struct RecoveryStrategyManager {
    config: StrategyConfig,
    previous_label: &'static str,
}

impl RecoveryStrategyManager {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            previous_label: NEUTRAL.label,
        }
    }

    /// High tier forwards the gate's decrease (when the mood permits easing);
    /// low tier never changes task structure.
    pub fn select(&mut self, reg: &RegulationState, gate: &GateDecision) -> RecoveryStrategy {
        let full = reg.mood_confidence >= self.config.full_adaptation_confidence;

        let strategy = if full {
            let entry = full_entry(reg.mood);
            let modifier = if entry.permits_easing && gate.delta < 0 { -1 } else { 0 };
            entry.build(modifier)
        } else {
            low_confidence_entry(reg.mood).build(0)
        };

        if strategy.label != self.previous_label {
            info!(
                "[RecoveryStrategy v{}] {} -> {} (mood={}, confidence={:.2})",
                STRATEGY_TABLE_VERSION,
                self.previous_label,
                strategy.label,
                reg.mood.name(),
                reg.mood_confidence
            );
        }
        self.previous_label = strategy.label;
        strategy
    }

    pub fn max_reply_chars(&self) -> usize {
        self.config.max_reply_chars
    }
}
