use std::collections::VecDeque;
use tracing::{debug, info};

use super::mood::{Mood, MoodReading};
use crate::config::ConsensusConfig;

/// Temporally smoothed mood, as seen by the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusMood {
    pub mood: Mood,
    pub confidence: f32,
}

impl Default for ConsensusMood {
    fn default() -> Self {
        Self {
            mood: Mood::Neutral,
            confidence: 0.0,
        }
    }
}

/// Majority-of-N debounce over the most recent fused readings.
///
/// A mood is only reported once it holds `majority` of the last `window`
/// readings; until then the previous consensus is held. A neutral reading
/// under a non-neutral majority softens it by at most one `neutral_decay`
/// step and never raises it; two consecutive neutral readings decay the
/// neutral consensus itself.
#[derive(Debug, Clone)]
pub struct MoodConsensus {
    config: ConsensusConfig,
    history: VecDeque<MoodReading>,
    current: ConsensusMood,
}

impl MoodConsensus {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.window),
            config,
            current: ConsensusMood::default(),
        }
    }

    pub fn current(&self) -> ConsensusMood {
        self.current
    }

    pub fn observe(&mut self, reading: MoodReading) -> ConsensusMood {
        if self.history.len() >= self.config.window {
            self.history.pop_front();
        }
        self.history.push_back(reading);

        let previous = self.current;

        // 1. Majority vote over the window
        let majority = Mood::ALL.into_iter().find(|m| {
            self.history.iter().filter(|r| r.mood == *m).count() >= self.config.majority
        });

        let mut next = match majority {
            Some(mood) => {
                let backing: Vec<f32> = self
                    .history
                    .iter()
                    .filter(|r| r.mood == mood)
                    .map(|r| r.confidence)
                    .collect();
                ConsensusMood {
                    mood,
                    confidence: backing.iter().sum::<f32>() / backing.len() as f32,
                }
            }
            // No agreement: hold what we had.
            None => previous,
        };

        // 2. Neutral decay
        if reading.mood == Mood::Neutral {
            let decay = self.config.neutral_decay;
            match majority {
                // A neutral blip pulls a held mood down by at most one decay
                // step and never lifts it.
                Some(mood) if mood != Mood::Neutral => {
                    let ceiling = if previous.mood == mood {
                        next.confidence.min(previous.confidence)
                    } else {
                        next.confidence
                    };
                    next.confidence = (reading.confidence * decay).max(ceiling * decay).min(ceiling);
                }
                Some(_) if self.last_two_neutral() => next.confidence *= decay,
                _ => {}
            }
        }

        next.confidence = next.confidence.clamp(0.0, 1.0);

        if next.mood != previous.mood {
            info!(
                "Mood consensus: {} -> {} ({:.2})",
                previous.mood.name(),
                next.mood.name(),
                next.confidence
            );
        } else {
            debug!("Mood consensus held: {} ({:.2})", next.mood.name(), next.confidence);
        }

        self.current = next;
        next
    }

    fn last_two_neutral(&self) -> bool {
        self.history.len() >= 2
            && self.history.iter().rev().take(2).all(|r| r.mood == Mood::Neutral)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current = ConsensusMood::default();
    }
}
