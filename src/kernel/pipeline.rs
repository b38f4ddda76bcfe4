use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::consensus::{ConsensusMood, MoodConsensus};
use super::fusion::{SignalFusion, Utterance};
use super::gate::{DifficultyGate, GateDecision};
use super::mood::Mood;
use super::regulation::RegulationState;
use super::reinforcement::{ReinforcementAdaptationManager, ReinforcementStyle};
use super::session::{SessionId, SessionState, TurnOutcome};
use super::strategy::{RecoveryStrategy, RecoveryStrategyManager};
use super::validate::check_reply;
use crate::config::EngineConfig;
use crate::error::{EngineError, UpdatePhase};
use crate::memory::preferences::extract_preference;
use crate::memory::store::UserStore;
use crate::memory::tiers::{RollingEntry, SessionSummary, TieredMemoryStore};
use crate::memory::types::{AggregateDelta, Preference, UserBaseline, UserId};

/// Everything the renderer is allowed to see for one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub user_input: String,
    pub concept: String,
    pub difficulty: u8,
    pub strategy: RecoveryStrategy,
    pub style: ReinforcementStyle,
    pub summary: Option<String>,
    pub recent: Vec<RollingEntry>,
    pub preferences: Vec<Preference>,
}

/// Output of the decision half of a turn.
#[derive(Debug, Clone)]
pub struct TurnDecision {
    pub session_id: SessionId,
    pub consensus: ConsensusMood,
    pub regulation: RegulationState,
    pub gate: GateDecision,
    pub strategy: RecoveryStrategy,
    pub style: ReinforcementStyle,
    pub context: RenderContext,
}

/// Output of the commit half of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub reply: String,
    pub trimmed: bool,
    pub outcome: TurnOutcome,
    pub difficulty: u8,
    pub difficulty_delta: i8,
    pub locked_turns: u8,
    pub summary_refreshed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    Written { attempts: u8 },
    /// Baseline came from safe defaults; nothing is written back.
    SkippedDegraded,
    /// Both attempts failed; the session's aggregate is lost.
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEndReport {
    pub session_id: SessionId,
    pub turns: u32,
    pub delta: AggregateDelta,
    pub write_back: WriteBack,
}

/// Decision inputs carried from `begin_turn` to `complete_turn`.
#[derive(Debug, Clone)]
struct PendingTurn {
    gate: GateDecision,
    strategy: RecoveryStrategy,
    style: ReinforcementStyle,
    mood: Mood,
    confidence: f32,
    prior_frustration: u32,
    user_input: String,
}

/// One child's session: the full per-turn pipeline from utterance to
/// committed state, plus the two persistence touch points.
pub struct SessionEngine {
    user_id: UserId,
    config: EngineConfig,
    store: Arc<dyn UserStore>,
    baseline: UserBaseline,

    fusion: SignalFusion,
    consensus: MoodConsensus,
    session: SessionState,
    gate: DifficultyGate,
    strategy: RecoveryStrategyManager,
    reinforcement: ReinforcementAdaptationManager,
    memory: TieredMemoryStore,

    pending: Option<PendingTurn>,
    // Style of the last committed reply; judged by the next consensus.
    awaiting_outcome: Option<ReinforcementStyle>,
    delta: AggregateDelta,
}

impl SessionEngine {
    pub fn start(
        user_id: impl Into<UserId>,
        concept: impl Into<String>,
        store: Arc<dyn UserStore>,
        config: EngineConfig,
    ) -> Self {
        Self::start_at(user_id, concept, store, config, Utc::now())
    }

    /// Session start: exactly one read from layer 5. A failed read degrades
    /// the session to safe defaults instead of failing it.
    pub fn start_at(
        user_id: impl Into<UserId>,
        concept: impl Into<String>,
        store: Arc<dyn UserStore>,
        config: EngineConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let user_id = user_id.into();
        let concept = concept.into();

        let baseline = match store.read_baseline(&user_id, now, &config.memory) {
            Ok(baseline) => baseline,
            Err(e) => {
                warn!("[Session] Baseline read failed ({}); running degraded", e);
                UserBaseline::safe_default(user_id.clone(), now)
            }
        };

        let difficulty = baseline.baseline_difficulty(&concept);
        let session = SessionState::new(concept, difficulty, config.regulation.clone());

        info!(
            "[Session {}] Started | difficulty={} degraded={}",
            session.id(),
            difficulty,
            baseline.degraded
        );

        Self {
            delta: AggregateDelta::new(user_id.clone()),
            user_id,
            fusion: SignalFusion::new(config.fusion.clone()),
            consensus: MoodConsensus::new(config.consensus.clone()),
            gate: DifficultyGate::new(config.regulation.clone()),
            strategy: RecoveryStrategyManager::new(config.strategy.clone()),
            reinforcement: ReinforcementAdaptationManager::new(
                baseline.reinforcement.clone(),
                config.reinforcement.clone(),
            ),
            memory: TieredMemoryStore::new(&config.memory),
            session,
            baseline,
            store,
            config,
            pending: None,
            awaiting_outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn is_degraded(&self) -> bool {
        self.baseline.degraded
    }
    pub fn baseline(&self) -> &UserBaseline {
        &self.baseline
    }
    pub fn session(&self) -> &SessionState {
        &self.session
    }
    pub fn memory(&self) -> &TieredMemoryStore {
        &self.memory
    }
    pub fn reinforcement(&self) -> &ReinforcementAdaptationManager {
        &self.reinforcement
    }
    pub fn pending_delta(&self) -> &AggregateDelta {
        &self.delta
    }

    pub fn set_concept(&mut self, concept: impl Into<String>) {
        self.session.set_concept(concept);
    }

    pub fn begin_turn(&mut self, utterance: &Utterance) -> Result<TurnDecision, EngineError> {
        self.begin_turn_at(utterance, Utc::now())
    }

    /// Decision half: fuse, smooth, update the session, then derive gate,
    /// strategy and style from the fresh regulation state.
    pub fn begin_turn_at(
        &mut self,
        utterance: &Utterance,
        now: DateTime<Utc>,
    ) -> Result<TurnDecision, EngineError> {
        let reading = self.fusion.fuse(utterance);
        let consensus = self.consensus.observe(reading);

        if let Some(style) = self.awaiting_outcome.take() {
            let stable = consensus.mood.is_stable()
                && consensus.confidence >= self.config.regulation.decision_confidence;
            self.reinforcement.record_outcome(style, stable);
        }

        let prior_frustration = self.session.consecutive_frustration();
        if let Err(e) = self.session.pre_decision(consensus.mood, consensus.confidence) {
            self.pending = None;
            self.memory.turn.clear();
            return Err(e);
        }

        let regulation = RegulationState::compute(&self.session, self.config.regulation.max_streak);
        let gate = self.gate.decide(&regulation);
        let strategy = self.strategy.select(&regulation, &gate);
        let style = self.reinforcement.get_style(&regulation);

        self.memory.turn.begin(&utterance.text, consensus.mood, style);
        let memory = self.memory.context(now);

        let mut preferences = self.baseline.preferences.clone();
        preferences.extend(self.delta.preference_additions.iter().cloned());

        let context = RenderContext {
            user_input: utterance.text.clone(),
            concept: self.session.current_concept().to_string(),
            difficulty: self.session.current_difficulty(),
            strategy: strategy.clone(),
            style,
            summary: memory.summary,
            recent: memory.recent,
            preferences,
        };

        self.pending = Some(PendingTurn {
            gate,
            strategy: strategy.clone(),
            style,
            mood: consensus.mood,
            confidence: consensus.confidence,
            prior_frustration,
            user_input: utterance.text.clone(),
        });

        Ok(TurnDecision {
            session_id: self.session.id(),
            consensus,
            regulation,
            gate,
            strategy,
            style,
            context,
        })
    }

    pub fn complete_turn(&mut self, reply: &str) -> Result<TurnReport, EngineError> {
        self.complete_turn_at(reply, Utc::now())
    }

    /// Commit half: validate the reply structurally, finalize the session
    /// and fold the turn into the session's aggregate.
    pub fn complete_turn_at(
        &mut self,
        reply: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnReport, EngineError> {
        let Some(pending) = self.pending.take() else {
            return Err(EngineError::InvalidOrdering {
                called: UpdatePhase::PostResponse,
            });
        };

        let checked = check_reply(reply, &pending.strategy, self.strategy.max_reply_chars());
        if let Err(e) = self.session.post_response(
            pending.gate.delta,
            checked.outcome,
            &pending.user_input,
            &checked.text,
        ) {
            self.memory.turn.clear();
            return Err(e);
        }

        self.count_emotional_event(&pending);

        let concept = self.session.current_concept().to_string();
        let entry = self.delta.concepts.entry(concept.clone()).or_default();
        entry.attempts += 1;
        if checked.outcome == TurnOutcome::Success && !pending.mood.is_distressed() {
            entry.successes += 1;
        }

        if let Some(pref) = extract_preference(&pending.user_input, now) {
            self.delta.preference_additions.retain(|p| p.topic != pref.topic);
            self.delta.preference_additions.push(pref);
        }

        self.memory.commit_turn(&checked.text, now);
        let summary_refreshed = self.memory.needs_summary();
        if summary_refreshed {
            let regulation =
                RegulationState::compute(&self.session, self.config.regulation.max_streak);
            let mastery = self.baseline.mastery_of(&concept);
            let summary = SessionSummary::build(
                &self.session,
                regulation.emotional_trend_score,
                self.reinforcement.active_style(),
                mastery,
            );
            self.memory.install_summary(summary);
        }

        self.awaiting_outcome = Some(pending.style);

        Ok(TurnReport {
            reply: checked.text,
            trimmed: checked.trimmed,
            outcome: checked.outcome,
            difficulty: self.session.current_difficulty(),
            difficulty_delta: pending.gate.delta,
            locked_turns: self.session.difficulty_locked_turns(),
            summary_refreshed,
        })
    }

    /// Discard an in-flight turn; the session returns to its pre-turn snapshot.
    pub fn abort_turn(&mut self) {
        if self.pending.take().is_some() {
            debug!("[Session {}] Turn aborted", self.session.id());
        }
        self.session.abort_turn();
        self.memory.turn.clear();
    }

    pub fn end(self) -> SessionEndReport {
        self.end_at(Utc::now())
    }

    /// Session end: one all-or-nothing write of the aggregate, retried once.
    pub fn end_at(mut self, now: DateTime<Utc>) -> SessionEndReport {
        self.abort_turn();

        let outcome = self.reinforcement.conclude();
        self.delta.reinforcement_counters = outcome.session_counters;
        self.delta.style_change = outcome.style_change;

        let session_id = self.session.id();
        let turns = self.session.turn_count();

        let write_back = if self.baseline.degraded {
            info!("[Session {}] Degraded session; skipping write-back", session_id);
            WriteBack::SkippedDegraded
        } else {
            self.write_with_retry(now)
        };

        info!(
            "[Session {}] Ended | turns={} write_back={:?}",
            session_id, turns, write_back
        );

        SessionEndReport {
            session_id,
            turns,
            delta: self.delta,
            write_back,
        }
    }

    fn write_with_retry(&self, now: DateTime<Utc>) -> WriteBack {
        for attempt in 1..=2u8 {
            match self.store.write_delta(&self.delta, now, &self.config.memory) {
                Ok(()) => return WriteBack::Written { attempts: attempt },
                Err(e) => warn!(
                    "[Session {}] Write-back attempt {} failed: {}",
                    self.session.id(),
                    attempt,
                    e
                ),
            }
        }
        warn!("[Session {}] Aggregate dropped after retry", self.session.id());
        WriteBack::Dropped
    }

    fn count_emotional_event(&mut self, turn: &PendingTurn) {
        if turn.confidence < self.config.regulation.decision_confidence {
            return;
        }
        if turn.mood.is_distressed() {
            self.delta.frustration_events += 1;
        } else if turn.mood.is_stable() {
            self.delta.stability_events += 1;
            if turn.prior_frustration > 0 {
                self.delta.recovery_events += 1;
            }
        }
    }
}

/// Owns every live session. Sessions are reached by id only.
pub struct SessionRegistry {
    config: EngineConfig,
    store: Arc<dyn UserStore>,
    sessions: HashMap<SessionId, SessionEngine>,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig, store: Arc<dyn UserStore>) -> Self {
        Self {
            config,
            store,
            sessions: HashMap::new(),
        }
    }

    pub fn start(&mut self, user_id: impl Into<UserId>, concept: impl Into<String>) -> SessionId {
        let engine = SessionEngine::start(user_id, concept, self.store.clone(), self.config.clone());
        let id = engine.id();
        self.sessions.insert(id, engine);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionEngine> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut SessionEngine> {
        self.sessions.get_mut(&id)
    }

    pub fn end(&mut self, id: SessionId) -> Option<SessionEndReport> {
        self.sessions.remove(&id).map(SessionEngine::end)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
