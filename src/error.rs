use thiserror::Error;

/// Which half of the two-phase session update was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    PreDecision,
    PostResponse,
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdatePhase::PreDecision => write!(f, "pre_decision"),
            UpdatePhase::PostResponse => write!(f, "post_response"),
        }
    }
}

/// Failures inside a single turn. None of these reach the child; the turn is
/// discarded and the session falls back to its pre-turn snapshot.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid update ordering: {called} called out of sequence")]
    InvalidOrdering { called: UpdatePhase },

    #[error("difficulty change refused: locked for {remaining} more turn(s)")]
    DifficultyLocked { remaining: u8 },

    #[error("renderer failed: {0}")]
    Render(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("session end failed: {0}")]
    Shutdown(String),
}

/// Failures at the persistence boundary (session start / session end only).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}
