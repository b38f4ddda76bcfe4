use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mood::{Mood, MoodReading, SourceWeights};
use crate::config::FusionConfig;

/// Prosody features for one utterance, as reported by the perception side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub rms: f32,
    /// Seconds.
    pub duration: f32,
    /// Words per second.
    pub rate: f32,
}

/// Untrusted perception output. Either half may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub audio: AudioFeatures,
}

impl Utterance {
    pub fn new(text: impl Into<String>, audio: AudioFeatures) -> Self {
        Self {
            text: text.into(),
            audio,
        }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(text, AudioFeatures::default())
    }
}

// Keyword tables. Matching is substring-based on the lowercased utterance.
const HAPPY_WORDS: &[&str] = &[
    "happy", "fun", "love", "yay", "great", "like", "good", "nice", "wow", "cool", "awesome",
    "play", "laugh", "smile", "friend", "thank", "yes", "okay", "sure", "excited", "best",
    "enjoy",
];
const SAD_WORDS: &[&str] = &[
    "sad", "cry", "hurt", "miss", "don't want", "go away", "alone", "tired", "sorry", "bad",
    "hate", "lost", "gone", "never", "nobody", "leave", "boring", "wish", "why",
];
const FRUSTRATED_WORDS: &[&str] = &[
    "can't", "stupid", "hate", "no", "stop", "don't", "wrong", "hard", "impossible", "ugh",
    "again", "not fair", "annoying", "shut up", "dumb", "break", "angry", "mad",
];
const ANXIOUS_WORDS: &[&str] = &[
    "scared", "afraid", "don't know", "help", "nervous", "worried", "what if", "maybe", "um",
    "uh", "panic", "dark", "monster", "loud", "too much", "can't do",
];
const POSITIVE_SHORTS: &[&str] = &["yes", "yeah", "okay", "ok", "good", "sure", "yay", "hi", "hello"];

const SHORT_UTTERANCE_WORDS: usize = 3;
const LOUD_RMS: f32 = 0.15;
const QUIET_RMS: f32 = 0.02;
const FAST_RATE: f32 = 3.0;
const SLOW_RATE: f32 = 0.8;

/// Combines the text and prosody channels into one reading per utterance.
#[derive(Debug, Clone)]
pub struct SignalFusion {
    config: FusionConfig,
}

impl SignalFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn fuse(&self, utterance: &Utterance) -> MoodReading {
        let (text_mood, text_conf) = classify_text(&utterance.text);
        let (audio_mood, audio_conf) = classify_audio(&utterance.audio, &utterance.text);

        // Transcription noise must not dominate: weak text hands the lead to audio.
        let weights = if text_conf < self.config.low_text_confidence {
            SourceWeights {
                text: self.config.fallback_text_weight,
                audio: self.config.fallback_audio_weight,
            }
        } else {
            SourceWeights {
                text: self.config.text_weight,
                audio: self.config.audio_weight,
            }
        };

        let text_score = text_conf * weights.text;
        let audio_score = audio_conf * weights.audio;

        // Ties go to text.
        let mood = if text_score >= audio_score { text_mood } else { audio_mood };

        // Weighted sum over the channels that back the chosen mood.
        let mut confidence = 0.0;
        if text_mood == mood {
            confidence += text_score;
        }
        if audio_mood == mood {
            confidence += audio_score;
        }

        debug!(
            "fusion: text={}({:.2}) audio={}({:.2}) -> {}({:.2})",
            text_mood.name(),
            text_conf,
            audio_mood.name(),
            audio_conf,
            mood.name(),
            confidence
        );

        MoodReading::new(mood, confidence, weights)
    }
}

/// Keyword classifier over the transcribed text.
pub fn classify_text(text: &str) -> (Mood, f32) {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        // Nothing to go on: neutral-leaning, zero confidence.
        return (Mood::Neutral, 0.0);
    }

    let word_count = lower.split_whitespace().count();
    if word_count <= SHORT_UTTERANCE_WORDS {
        let stripped = lower.trim_end_matches(['.', '!', '?']);
        if POSITIVE_SHORTS.contains(&stripped) {
            return (Mood::Happy, 0.3);
        }
        return (Mood::Quiet, 0.4);
    }

    let tables = [
        (Mood::Happy, HAPPY_WORDS),
        (Mood::Sad, SAD_WORDS),
        (Mood::Frustrated, FRUSTRATED_WORDS),
        (Mood::Anxious, ANXIOUS_WORDS),
    ];

    let mut best = (Mood::Neutral, 0.0f32);
    for (mood, words) in tables {
        let hits = words.iter().filter(|w| lower.contains(*w)).count();
        let score = hits as f32 / words.len() as f32;
        if score > best.1 {
            best = (mood, score);
        }
    }

    if best.1 == 0.0 {
        return (Mood::Neutral, 0.5);
    }
    (best.0, (best.1 * 5.0).min(1.0))
}

/// Prosody classifier over loudness and speaking rate.
pub fn classify_audio(features: &AudioFeatures, text: &str) -> (Mood, f32) {
    let valid = features.rms.is_finite()
        && features.duration.is_finite()
        && features.rate.is_finite()
        && features.duration > 0.0;
    if !valid {
        return (Mood::Neutral, 0.0);
    }

    let words = text.split_whitespace().count();
    if features.rms > LOUD_RMS {
        return (Mood::Frustrated, 0.4);
    }
    if features.rms < QUIET_RMS {
        return (Mood::Sad, 0.4);
    }
    if features.rate > FAST_RATE {
        return (Mood::Anxious, 0.3);
    }
    if features.rate < SLOW_RATE && words > 0 {
        return (Mood::Sad, 0.3);
    }
    (Mood::Neutral, 0.2)
}
