use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Completed,
    Cancelled,
}

/// Speech output. Implementations must stop promptly once `cancel` fires.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn speak(
        &self,
        text: &str,
        length_scale: f32,
        cancel: CancellationToken,
    ) -> Result<Playback, EngineError>;
}

/// Prints the reply and holds for roughly the time it would take to say it.
#[derive(Debug, Clone)]
pub struct ConsoleActuator {
    ms_per_char: u64,
}

impl ConsoleActuator {
    pub fn new(ms_per_char: u64) -> Self {
        Self { ms_per_char }
    }
}

impl Default for ConsoleActuator {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl Actuator for ConsoleActuator {
    async fn speak(
        &self,
        text: &str,
        length_scale: f32,
        cancel: CancellationToken,
    ) -> Result<Playback, EngineError> {
        println!("[SPEAK] {}", text);

        // Lower length_scale means slower speech.
        let scale = if length_scale.is_finite() && length_scale > 0.0 { length_scale } else { 1.0 };
        let base = self.ms_per_char.saturating_mul(text.chars().count() as u64);
        let duration = Duration::from_millis((base as f32 / scale) as u64);

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Actuator] Playback cancelled");
                Ok(Playback::Cancelled)
            }
            _ = tokio::time::sleep(duration) => Ok(Playback::Completed),
        }
    }
}
