use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MemoryConfig;
use crate::kernel::reinforcement::{ReinforcementProfile, ReinforcementStyle, StyleCounters};

pub type UserId = String;

pub const MAX_MASTERY: u8 = 5;
const DECAY_PERIOD_SECS: i64 = 24 * 60 * 60;

/// Per-concept mastery tracking, 0-5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningProgress {
    pub mastery: u8,
    pub attempt_count: u32,
}

/// Aggregated emotional counts. No narratives, no labels.
///
/// Counters only ever shrink through decay and grow through session-end
/// increments; they never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionalMetrics {
    pub frustration_count: f64,
    pub recovery_count: f64,
    pub stability_count: f64,
    pub last_decay_timestamp: DateTime<Utc>,
}

impl EmotionalMetrics {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            frustration_count: 0.0,
            recovery_count: 0.0,
            stability_count: 0.0,
            last_decay_timestamp: now,
        }
    }

    /// Compound decay for every whole 24h period since the last decay. The
    /// partial period carries over to the next read.
    pub fn decayed(&self, now: DateTime<Utc>, factor: f64) -> Self {
        let elapsed = (now - self.last_decay_timestamp).num_seconds();
        let periods = elapsed.div_euclid(DECAY_PERIOD_SECS);
        if periods <= 0 {
            return *self;
        }

        let scale = factor.powi(periods.min(i32::MAX as i64) as i32);
        Self {
            frustration_count: (self.frustration_count * scale).max(0.0),
            recovery_count: (self.recovery_count * scale).max(0.0),
            stability_count: (self.stability_count * scale).max(0.0),
            last_decay_timestamp: self.last_decay_timestamp
                + Duration::seconds(periods * DECAY_PERIOD_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Like,
    Dislike,
}

/// A single structured preference (topic + sentiment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub topic: String,
    pub sentiment: Sentiment,
    pub recorded_at: DateTime<Utc>,
}

/// Everything persisted about one user. Owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentUserRecord {
    pub user_id: UserId,
    pub learning_progress: BTreeMap<String, LearningProgress>,
    pub emotional_metrics: EmotionalMetrics,
    pub reinforcement: ReinforcementProfile,
    pub preferences: Vec<Preference>,
}

impl PersistentUserRecord {
    pub fn new(user_id: impl Into<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            learning_progress: BTreeMap::new(),
            emotional_metrics: EmotionalMetrics::new(now),
            reinforcement: ReinforcementProfile::default(),
            preferences: Vec::new(),
        }
    }

    /// Read-side snapshot: decayed counters, expired preferences hidden.
    pub fn baseline(&self, now: DateTime<Utc>, config: &MemoryConfig) -> UserBaseline {
        let horizon = now - Duration::days(config.preference_expiry_days);
        UserBaseline {
            user_id: self.user_id.clone(),
            mastery: self
                .learning_progress
                .iter()
                .map(|(concept, p)| (concept.clone(), p.mastery))
                .collect(),
            reinforcement: self.reinforcement.clone(),
            emotional_metrics: self.emotional_metrics.decayed(now, config.decay_factor),
            preferences: self
                .preferences
                .iter()
                .filter(|p| p.recorded_at >= horizon)
                .cloned()
                .collect(),
            degraded: false,
        }
    }

    /// Fold a session's aggregate delta into the record. Pure: callers
    /// persist the result as one unit.
    pub fn apply(&mut self, delta: &AggregateDelta, now: DateTime<Utc>, config: &MemoryConfig) {
        // 1. Bring counters up to date before adding to them
        let mut metrics = self.emotional_metrics.decayed(now, config.decay_factor);
        metrics.frustration_count += delta.frustration_events as f64;
        metrics.recovery_count += delta.recovery_events as f64;
        metrics.stability_count += delta.stability_events as f64;
        self.emotional_metrics = metrics;

        // 2. Learning progress
        for (concept, change) in &delta.concepts {
            let progress = self.learning_progress.entry(concept.clone()).or_default();
            progress.attempt_count += change.attempts;
            let gained = change.successes.min(MAX_MASTERY as u32) as u8;
            progress.mastery = progress.mastery.saturating_add(gained).min(MAX_MASTERY);
        }

        // 3. Reinforcement profile
        for (style, counters) in &delta.reinforcement_counters {
            let entry = self.reinforcement.counters.entry(*style).or_default();
            *entry = entry.merged(counters);
        }
        if let Some(style) = delta.style_change {
            self.reinforcement.preferred_style = style;
        }

        // 4. Preferences: prune expired, dedupe by topic, cap by evicting oldest
        let horizon = now - Duration::days(config.preference_expiry_days);
        self.preferences.retain(|p| p.recorded_at >= horizon);
        for addition in &delta.preference_additions {
            if let Some(existing) = self.preferences.iter_mut().find(|p| p.topic == addition.topic) {
                existing.sentiment = addition.sentiment;
                existing.recorded_at = addition.recorded_at;
                continue;
            }
            if self.preferences.len() >= config.max_preferences {
                if let Some(oldest) = self
                    .preferences
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, p)| p.recorded_at)
                    .map(|(i, _)| i)
                {
                    self.preferences.remove(oldest);
                }
            }
            if config.max_preferences > 0 {
                self.preferences.push(addition.clone());
            }
        }
    }
}

/// Read contract at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBaseline {
    pub user_id: UserId,
    pub mastery: BTreeMap<String, u8>,
    pub reinforcement: ReinforcementProfile,
    pub emotional_metrics: EmotionalMetrics,
    pub preferences: Vec<Preference>,
    /// Set when the store could not be read; such sessions never write back.
    pub degraded: bool,
}

impl UserBaseline {
    /// Hardcoded safe defaults used when persistence is unavailable.
    pub fn safe_default(user_id: impl Into<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            mastery: BTreeMap::new(),
            reinforcement: ReinforcementProfile::default(),
            emotional_metrics: EmotionalMetrics::new(now),
            preferences: Vec::new(),
            degraded: true,
        }
    }

    pub fn mastery_of(&self, concept: &str) -> u8 {
        self.mastery.get(concept).copied().unwrap_or(0)
    }

    /// Starting difficulty for a concept, from mastery.
    /// 0-1 -> 1, 2-3 -> 2, 4 -> 3, 5 -> 4.
    pub fn baseline_difficulty(&self, concept: &str) -> u8 {
        if self.degraded {
            return 1;
        }
        match self.mastery_of(concept) {
            0..=1 => 1,
            2..=3 => 2,
            4 => 3,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDelta {
    pub attempts: u32,
    pub successes: u32,
}

/// Write contract at session end: counter increments and selections only,
/// never raw content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateDelta {
    pub user_id: UserId,
    pub frustration_events: u32,
    pub recovery_events: u32,
    pub stability_events: u32,
    pub concepts: BTreeMap<String, ConceptDelta>,
    pub reinforcement_counters: BTreeMap<ReinforcementStyle, StyleCounters>,
    pub style_change: Option<ReinforcementStyle>,
    pub preference_additions: Vec<Preference>,
}

impl AggregateDelta {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}
