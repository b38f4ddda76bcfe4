use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

pub const MIN_LOCK_TURNS: u8 = 2;
pub const MIN_DECISION_CONFIDENCE: f32 = 0.6;

// ============================================================================
// Top-level config
// ============================================================================

/// Tunable constants for the whole engine. Every default equals the
/// documented design value. The difficulty lock and decision confidence can
/// only be made stricter; `validate` rejects anything weaker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub consensus: ConsensusConfig,
    pub regulation: RegulationConfig,
    pub strategy: StrategyConfig,
    pub reinforcement: ReinforcementConfig,
    pub memory: MemoryConfig,
    pub interaction: InteractionConfig,
    pub renderer: RendererConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REGULATION_STORE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RENDERER_BASE_URL") {
            self.renderer.base_url = v;
        }
    }

    /// Reject combinations the decision core cannot honour.
    pub fn validate(&self) -> Result<(), EngineError> {
        let f = &self.fusion;
        if (f.text_weight + f.audio_weight - 1.0).abs() > 1e-6
            || (f.fallback_text_weight + f.fallback_audio_weight - 1.0).abs() > 1e-6
        {
            return Err(EngineError::Config("fusion weights must sum to 1.0".into()));
        }
        let c = &self.consensus;
        if c.window == 0 || c.majority == 0 || c.majority > c.window {
            return Err(EngineError::Config(format!(
                "consensus majority {} must be within window {}",
                c.majority, c.window
            )));
        }
        let r = &self.regulation;
        if r.max_streak == 0
            || r.frustration_turns > r.max_streak
            || r.stability_turns > r.max_streak
        {
            return Err(EngineError::Config(
                "streak thresholds must not exceed max_streak".into(),
            ));
        }
        // Safety floors: at most one difficulty change per three turns, and
        // never on weaker evidence than the documented gate.
        if r.lock_turns < MIN_LOCK_TURNS {
            return Err(EngineError::Config(format!(
                "lock_turns {} is below the minimum of {}",
                r.lock_turns, MIN_LOCK_TURNS
            )));
        }
        if !(MIN_DECISION_CONFIDENCE..=1.0).contains(&r.decision_confidence) {
            return Err(EngineError::Config(format!(
                "decision_confidence must be within [{}, 1.0]",
                MIN_DECISION_CONFIDENCE
            )));
        }
        if !(0.0..=1.0).contains(&c.neutral_decay) {
            return Err(EngineError::Config("neutral_decay must be within [0, 1]".into()));
        }
        if self.memory.rolling_capacity == 0 {
            return Err(EngineError::Config("rolling_capacity must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.memory.decay_factor) {
            return Err(EngineError::Config("decay_factor must be within [0, 1]".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub text_weight: f32,
    pub audio_weight: f32,
    /// Below this text confidence the audio channel takes the lead.
    pub low_text_confidence: f32,
    pub fallback_text_weight: f32,
    pub fallback_audio_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            text_weight: 0.6,
            audio_weight: 0.4,
            low_text_confidence: 0.2,
            fallback_text_weight: 0.35,
            fallback_audio_weight: 0.65,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub window: usize,
    pub majority: usize,
    pub neutral_decay: f32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            window: 3,
            majority: 2,
            neutral_decay: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegulationConfig {
    pub max_streak: u32,
    /// Minimum mood confidence for streak updates and difficulty changes.
    pub decision_confidence: f32,
    pub frustration_turns: u32,
    pub stability_turns: u32,
    pub lock_turns: u8,
}

impl Default for RegulationConfig {
    fn default() -> Self {
        Self {
            max_streak: 5,
            decision_confidence: 0.6,
            frustration_turns: 2,
            stability_turns: 3,
            lock_turns: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// At or above this confidence the full strategy applies; below it, tone only.
    pub full_adaptation_confidence: f32,
    /// Hard ceiling on spoken reply length, in characters.
    pub max_reply_chars: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            full_adaptation_confidence: 0.5,
            max_reply_chars: 400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReinforcementConfig {
    pub min_events: u32,
    /// Required success-rate lead (0.15 = 15 percentage points).
    pub switch_margin: f64,
    /// Offer a candidate style every N calm turns. 0 disables probing.
    pub probe_interval: u32,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            min_events: 5,
            switch_margin: 0.15,
            probe_interval: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub rolling_capacity: usize,
    pub entry_chars: usize,
    pub rolling_ttl_hours: i64,
    pub summary_interval: u32,
    pub summary_fill_ratio: f32,
    pub decay_factor: f64,
    pub max_preferences: usize,
    pub preference_expiry_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            rolling_capacity: 5,
            entry_chars: 200,
            rolling_ttl_hours: 24,
            summary_interval: 5,
            summary_fill_ratio: 0.75,
            decay_factor: 0.95,
            max_preferences: 20,
            preference_expiry_days: 182,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub wake_word: String,
    pub sleep_word: String,
    pub interrupt_keywords: Vec<String>,
    pub barge_in_frames: u32,
    /// How long an armed monitor stays armed after the last loud frame, so a
    /// keyword transcribed after the child stops talking still counts.
    pub barge_in_latch_ms: u64,
    pub noise_floor_rms: f32,
    pub interrupt_cooldown_ms: u64,
    pub acknowledgment: String,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            wake_word: "friday".to_string(),
            sleep_word: "shutdown".to_string(),
            interrupt_keywords: vec!["stop".into(), "wait".into(), "pause".into()],
            barge_in_frames: 10,
            barge_in_latch_ms: 1000,
            noise_floor_rms: 0.005,
            interrupt_cooldown_ms: 1000,
            acknowledgment: "Okay, I'm listening.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub n_predict: usize,
    pub temperature: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 2000,
            n_predict: 96,
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("user_memory.json"),
        }
    }
}
