use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::InteractionConfig;

/// What a frame did to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    /// Sustained speech just crossed the debounce threshold.
    Armed,
    /// Energy dropped; the consecutive count restarted.
    Reset,
}

/// Energy-based barge-in debounce for speech during playback.
///
/// Frames above the noise floor accumulate; a quiet frame restarts the count.
/// Once enough consecutive loud frames have been seen the monitor is armed,
/// and it stays armed for `latch` after the last loud frame so that a keyword
/// transcribed after the child stops talking still counts. An interrupt is
/// never honoured twice inside the cooldown.
pub struct BargeInMonitor {
    noise_floor_rms: f32,
    required_frames: u32,
    latch: Duration,
    cooldown: Duration,

    // State
    consecutive_frames: u32,
    last_armed_voice: Option<Instant>,
    last_interrupt: Option<Instant>,
}

impl BargeInMonitor {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            noise_floor_rms: config.noise_floor_rms,
            required_frames: config.barge_in_frames.max(1),
            latch: Duration::from_millis(config.barge_in_latch_ms),
            cooldown: Duration::from_millis(config.interrupt_cooldown_ms),
            consecutive_frames: 0,
            last_armed_voice: None,
            last_interrupt: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.is_armed_at(Instant::now())
    }

    pub fn is_armed_at(&self, now: Instant) -> bool {
        self.last_armed_voice
            .map_or(false, |t| now.saturating_duration_since(t) <= self.latch)
    }

    pub fn consecutive_frames(&self) -> u32 {
        self.consecutive_frames
    }

    /// Feed one microphone frame captured while the device is speaking.
    pub fn process_frame(&mut self, samples: &[f32]) -> Option<FrameSignal> {
        self.process_frame_at(samples, Instant::now())
    }

    pub fn process_frame_at(&mut self, samples: &[f32], now: Instant) -> Option<FrameSignal> {
        if samples.is_empty() {
            return None;
        }

        let sq_sum: f32 = samples.iter().map(|&x| x * x).sum();
        let rms = (sq_sum / samples.len() as f32).sqrt();

        if rms.is_finite() && rms > self.noise_floor_rms {
            let was_armed = self.is_armed_at(now);
            self.consecutive_frames = self.consecutive_frames.saturating_add(1);
            if self.consecutive_frames >= self.required_frames {
                self.last_armed_voice = Some(now);
                if !was_armed {
                    debug!("[BargeIn] Armed after {} frames", self.consecutive_frames);
                    return Some(FrameSignal::Armed);
                }
            }
            None
        } else if self.consecutive_frames > 0 {
            // The latch survives; only the count restarts.
            self.consecutive_frames = 0;
            Some(FrameSignal::Reset)
        } else {
            None
        }
    }

    /// An interrupt keyword was transcribed. Returns true if it counts.
    pub fn confirm_interrupt(&mut self, now: Instant) -> bool {
        if !self.is_armed_at(now) {
            debug!("[BargeIn] Keyword ignored: not armed");
            return false;
        }
        if let Some(last) = self.last_interrupt {
            if now.saturating_duration_since(last) < self.cooldown {
                debug!("[BargeIn] Keyword ignored: cooldown");
                return false;
            }
        }

        info!("[BargeIn] Interrupt confirmed");
        self.last_interrupt = Some(now);
        self.reset();
        true
    }

    /// Playback started or stopped; stale energy must not carry over.
    pub fn reset(&mut self) {
        self.consecutive_frames = 0;
        self.last_armed_voice = None;
    }
}
