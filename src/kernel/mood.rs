use serde::{Deserialize, Serialize};

/// Closed set of mood classifications. Adding a category is a compile-time
/// change that every `match` in the engine has to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Neutral,
    Happy,
    Frustrated,
    Anxious,
    Sad,
    Quiet,
}

impl Default for Mood {
    fn default() -> Self {
        Self::Neutral
    }
}

impl Mood {
    pub const ALL: [Mood; 6] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Frustrated,
        Mood::Anxious,
        Mood::Sad,
        Mood::Quiet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Frustrated => "frustrated",
            Mood::Anxious => "anxious",
            Mood::Sad => "sad",
            Mood::Quiet => "quiet",
        }
    }

    /// Feeds the frustration streak.
    pub fn is_distressed(self) -> bool {
        matches!(self, Mood::Frustrated | Mood::Sad)
    }

    /// Feeds the stability streak.
    pub fn is_stable(self) -> bool {
        matches!(self, Mood::Neutral | Mood::Happy)
    }
}

/// Relative weight each channel contributed to a fused reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    pub text: f32,
    pub audio: f32,
}

/// One fused mood estimate for one utterance. Consumed immediately by
/// `MoodConsensus`; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodReading {
    pub mood: Mood,
    pub confidence: f32, // 0.0 - 1.0
    pub source_weights: SourceWeights,
}

impl MoodReading {
    pub fn new(mood: Mood, confidence: f32, source_weights: SourceWeights) -> Self {
        Self {
            mood,
            confidence: sanitize_unit(confidence),
            source_weights,
        }
    }
}

/// Clamp into [0, 1], mapping NaN to 0.
pub(crate) fn sanitize_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
