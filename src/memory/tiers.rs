use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::MemoryConfig;
use crate::kernel::mood::Mood;
use crate::kernel::reinforcement::ReinforcementStyle;
use crate::kernel::session::{truncate_chars, SessionState};

// ============================================================================
// Layer 1: the turn in flight
// ============================================================================

/// Scratch space for the current turn. Cleared every turn, never persisted.
#[derive(Debug, Clone, Default)]
pub struct TurnBuffer {
    pub user_input: String,
    pub mood: Option<Mood>,
    pub style: Option<ReinforcementStyle>,
}

impl TurnBuffer {
    pub fn begin(&mut self, user_input: &str, mood: Mood, style: ReinforcementStyle) {
        self.user_input = user_input.to_string();
        self.mood = Some(mood);
        self.style = Some(style);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.mood.is_none()
    }
}

// ============================================================================
// Layer 2: rolling window of recent turns
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingEntry {
    pub user: String,
    pub reply: String,
    pub mood: Mood,
    pub at: DateTime<Utc>,
}

impl RollingEntry {
    pub fn chars(&self) -> usize {
        self.user.chars().count() + self.reply.chars().count()
    }
}

/// Fixed-capacity FIFO. Each entry holds at most `entry_chars` characters
/// across user text and reply, and expires after `rolling_ttl_hours`.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    entries: VecDeque<RollingEntry>,
    capacity: usize,
    entry_chars: usize,
    ttl: Duration,
}

impl RollingBuffer {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.rolling_capacity),
            capacity: config.rolling_capacity.max(1),
            entry_chars: config.entry_chars,
            ttl: Duration::hours(config.rolling_ttl_hours),
        }
    }

    pub fn push(&mut self, user: &str, reply: &str, mood: Mood, at: DateTime<Utc>) {
        let user = truncate_chars(user, self.entry_chars / 2);
        let reply = truncate_chars(reply, self.entry_chars - user.chars().count());

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RollingEntry { user, reply, mood, at });
    }

    /// Drop entries older than the TTL.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|e| now - e.at < self.ttl);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("[RollingBuffer] Expired {} entr(ies)", dropped);
        }
    }

    /// Share of the total character budget in use, 0.0 - 1.0.
    pub fn fill_ratio(&self) -> f32 {
        let budget = (self.capacity * self.entry_chars).max(1) as f32;
        let used: usize = self.entries.iter().map(RollingEntry::chars).sum();
        (used as f32 / budget).min(1.0)
    }

    pub fn drain(&mut self) -> Vec<RollingEntry> {
        self.entries.drain(..).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RollingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Layer 3: structured session summary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Improving,
    Declining,
    Steady,
}

impl TrendLabel {
    fn name(self) -> &'static str {
        match self {
            TrendLabel::Improving => "improving",
            TrendLabel::Declining => "declining",
            TrendLabel::Steady => "steady",
        }
    }
}

/// Deterministic, non-narrative snapshot of where the session stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub concept: String,
    pub difficulty: u8,
    pub turn: u32,
    pub trend: TrendLabel,
    pub trend_score: f32,
    pub frustration_streak: u32,
    pub stability_streak: u32,
    pub style: ReinforcementStyle,
    pub mastery: u8,
}

impl SessionSummary {
    pub fn build(
        session: &SessionState,
        trend_score: f32,
        style: ReinforcementStyle,
        mastery: u8,
    ) -> Self {
        let trend = if session.consecutive_stability() >= 2 {
            TrendLabel::Improving
        } else if session.consecutive_frustration() >= 2 {
            TrendLabel::Declining
        } else {
            TrendLabel::Steady
        };

        Self {
            concept: session.current_concept().to_string(),
            difficulty: session.current_difficulty(),
            turn: session.turn_count(),
            trend,
            trend_score,
            frustration_streak: session.consecutive_frustration(),
            stability_streak: session.consecutive_stability(),
            style,
            mastery,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[Session State]\n\
             Concept: {} | Difficulty: {}/5 | Turn: {}\n\
             Trend: {} ({:+.2}) | Frustration streak: {} | Stability streak: {}\n\
             Reinforcement: {} | Mastery: {}/5",
            self.concept,
            self.difficulty,
            self.turn,
            self.trend.name(),
            self.trend_score,
            self.frustration_streak,
            self.stability_streak,
            self.style.name(),
            self.mastery
        )
    }
}

// ============================================================================
// Layers 1-3 together
// ============================================================================

/// What the renderer gets to see of the session's past.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContext {
    pub summary: Option<String>,
    pub recent: Vec<RollingEntry>,
}

/// Session-scoped memory tiers. Nothing here outlives the session; layer 4
/// is `SessionState` and layer 5 sits behind `UserStore`.
#[derive(Debug, Clone)]
pub struct TieredMemoryStore {
    pub turn: TurnBuffer,
    rolling: RollingBuffer,
    summary: Option<SessionSummary>,
    turns_since_summary: u32,
    summary_interval: u32,
    summary_fill_ratio: f32,
}

impl TieredMemoryStore {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            turn: TurnBuffer::default(),
            rolling: RollingBuffer::new(config),
            summary: None,
            turns_since_summary: 0,
            summary_interval: config.summary_interval.max(1),
            summary_fill_ratio: config.summary_fill_ratio,
        }
    }

    /// Move the finished turn from layer 1 into layer 2.
    pub fn commit_turn(&mut self, reply: &str, now: DateTime<Utc>) {
        let mood = self.turn.mood.unwrap_or_default();
        self.rolling.push(&self.turn.user_input, reply, mood, now);
        self.turn.clear();
        self.turns_since_summary += 1;
    }

    pub fn needs_summary(&self) -> bool {
        self.turns_since_summary >= self.summary_interval
            || self.rolling.fill_ratio() > self.summary_fill_ratio
    }

    /// Install a fresh summary. The raw turns it covers are dropped.
    pub fn install_summary(&mut self, summary: SessionSummary) {
        let replaced = self.rolling.drain().len();
        debug!(
            "[Memory] Summary at turn {} replaced {} raw turn(s)",
            summary.turn, replaced
        );
        self.summary = Some(summary);
        self.turns_since_summary = 0;
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn rolling(&self) -> &RollingBuffer {
        &self.rolling
    }

    pub fn context(&mut self, now: DateTime<Utc>) -> MemoryContext {
        self.rolling.expire(now);
        MemoryContext {
            summary: self.summary.as_ref().map(SessionSummary::render),
            recent: self.rolling.entries().cloned().collect(),
        }
    }
}
