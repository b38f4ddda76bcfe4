use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::regulation::RegulationState;
use crate::config::ReinforcementConfig;

/// Encouragement styles the renderer can be asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReinforcementStyle {
    PraiseBased,
    AchievementBased,
    CalmValidation,
    PlayfulEncouragement,
}

impl Default for ReinforcementStyle {
    fn default() -> Self {
        Self::CalmValidation
    }
}

impl ReinforcementStyle {
    pub const ALL: [ReinforcementStyle; 4] = [
        ReinforcementStyle::PraiseBased,
        ReinforcementStyle::AchievementBased,
        ReinforcementStyle::CalmValidation,
        ReinforcementStyle::PlayfulEncouragement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PraiseBased => "praise_based",
            Self::AchievementBased => "achievement_based",
            Self::CalmValidation => "calm_validation",
            Self::PlayfulEncouragement => "playful_encouragement",
        }
    }

    /// Renderer instruction for this style.
    pub fn prompt(self) -> &'static str {
        match self {
            Self::PraiseBased => {
                "Use warm praise when the child succeeds. Example: 'Great job! You did it!' \
                 Keep praise genuine and calm."
            }
            Self::AchievementBased => {
                "Acknowledge specific achievements. Example: 'You got that right! You are \
                 getting better at this.' Focus on observable progress, not personality."
            }
            Self::CalmValidation => {
                "Use calm, steady validation. Example: 'You are doing well. Let us keep going.' \
                 Minimal excitement, maximum steadiness."
            }
            Self::PlayfulEncouragement => {
                "Use gentle, playful encouragement. Example: 'That was fun! Want to try one \
                 more?' Keep energy moderate, never hyperactive."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleCounters {
    pub total_events: u32,
    pub successes: u32,
}

impl StyleCounters {
    pub fn success_rate(&self) -> f64 {
        if self.total_events == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_events as f64
        }
    }

    pub fn merged(&self, other: &StyleCounters) -> StyleCounters {
        StyleCounters {
            total_events: self.total_events + other.total_events,
            successes: self.successes + other.successes,
        }
    }
}

/// Persistent, one per user. Mutated only at session end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReinforcementProfile {
    pub preferred_style: ReinforcementStyle,
    pub counters: BTreeMap<ReinforcementStyle, StyleCounters>,
}

impl ReinforcementProfile {
    pub fn counters_for(&self, style: ReinforcementStyle) -> StyleCounters {
        self.counters.get(&style).copied().unwrap_or_default()
    }
}

/// What the session contributes back to the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReinforcementOutcome {
    pub style_change: Option<ReinforcementStyle>,
    pub session_counters: BTreeMap<ReinforcementStyle, StyleCounters>,
}

/// Conservative style adaptation with a hard exploitation lock: evidence is
/// gathered per session, a switch is evaluated once at session end, and at
/// most one switch ever happens per session.
#[derive(Debug, Clone)]
pub struct ReinforcementAdaptationManager {
    config: ReinforcementConfig,
    profile: ReinforcementProfile,
    active: ReinforcementStyle,
    session: BTreeMap<ReinforcementStyle, StyleCounters>,
    switched: Option<ReinforcementStyle>,
    concluded: bool,
    calm_turns: u32,
    probe_cursor: usize,
}

impl ReinforcementAdaptationManager {
    pub fn new(profile: ReinforcementProfile, config: ReinforcementConfig) -> Self {
        let preferred = profile.preferred_style;
        let evidence = profile.counters_for(preferred).total_events;

        // Too little history behind the stored preference: start calm.
        let active = if evidence < config.min_events {
            ReinforcementStyle::CalmValidation
        } else {
            preferred
        };

        info!(
            "[Reinforcement] Active style: {} (stored preference {}, {} events)",
            active.name(),
            preferred.name(),
            evidence
        );

        Self {
            config,
            profile,
            active,
            session: BTreeMap::new(),
            switched: None,
            concluded: false,
            calm_turns: 0,
            probe_cursor: 0,
        }
    }

    pub fn active_style(&self) -> ReinforcementStyle {
        self.active
    }

    pub fn session_counters(&self, style: ReinforcementStyle) -> StyleCounters {
        self.session.get(&style).copied().unwrap_or_default()
    }

    /// Style for the coming reply. Usually the active style; on every
    /// `probe_interval`-th calm turn a candidate style is offered instead so
    /// that alternatives accumulate evidence.
    pub fn get_style(&mut self, reg: &RegulationState) -> ReinforcementStyle {
        if self.config.probe_interval == 0 || self.concluded || !reg.is_calm() {
            return self.active;
        }

        self.calm_turns += 1;
        if self.calm_turns % self.config.probe_interval != 0 {
            return self.active;
        }

        let candidates: Vec<ReinforcementStyle> = ReinforcementStyle::ALL
            .into_iter()
            .filter(|s| *s != self.active)
            .collect();
        let probe = candidates[self.probe_cursor % candidates.len()];
        self.probe_cursor += 1;

        debug!("[Reinforcement] Probing {} on a calm turn", probe.name());
        probe
    }

    /// Session-local accounting only; nothing is persisted until `conclude`.
    pub fn record_outcome(&mut self, style: ReinforcementStyle, turn_stable: bool) {
        let counters = self.session.entry(style).or_default();
        counters.total_events += 1;
        if turn_stable {
            counters.successes += 1;
        }
        debug!(
            "[Reinforcement] {}: {}/{} ({:.0}% success)",
            style.name(),
            counters.successes,
            counters.total_events,
            counters.success_rate() * 100.0
        );
    }

    /// Session-end evaluation. Idempotent: the second call reports the same
    /// change and never evaluates candidates again.
    pub fn conclude(&mut self) -> ReinforcementOutcome {
        if !self.concluded {
            self.concluded = true;
            self.switched = self.evaluate_switch();
            if let Some(style) = self.switched {
                info!(
                    "[Reinforcement] Style adapted: {} -> {}",
                    self.active.name(),
                    style.name()
                );
                self.active = style;
            }
        }

        ReinforcementOutcome {
            style_change: self.switched,
            session_counters: self.session.clone(),
        }
    }

    fn evaluate_switch(&self) -> Option<ReinforcementStyle> {
        let active_session = self.session_counters(self.active);
        let active_rate = if active_session.total_events >= self.config.min_events {
            active_session.success_rate()
        } else {
            // Thin session evidence: judge the active style on its whole history.
            self.profile
                .counters_for(self.active)
                .merged(&active_session)
                .success_rate()
        };

        let mut candidates: Vec<(ReinforcementStyle, f64)> = self
            .session
            .iter()
            .filter(|(style, c)| **style != self.active && c.total_events >= self.config.min_events)
            .map(|(style, c)| (*style, c.success_rate()))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        // First qualifying candidate wins; the rest are ignored.
        candidates
            .into_iter()
            .find(|(_, rate)| rate - active_rate >= self.config.switch_margin - 1e-9)
            .map(|(style, _)| style)
    }
}
