use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::monitor::BargeInMonitor;
use super::fusion::{AudioFeatures, Utterance};
use super::interaction::{
    detect_control_word, ControlWord, InteractionEvent, InteractionState, InteractionStateMachine,
};
use super::pipeline::{SessionEndReport, SessionEngine};
use crate::config::{EngineConfig, InteractionConfig};
use crate::error::EngineError;
use crate::services::{Playback, Services};

/// Inputs to the shell. Transcripts and frames come from the device driver;
/// `PlaybackFinished` is posted back by the reactor's own playback tasks.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    Transcript { text: String, audio: Option<AudioFeatures> },
    AudioFrame(Vec<f32>),
    PlaybackFinished { playback_id: u64 },
    Shutdown,
}

struct ActivePlayback {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Counters for the whole shell lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellStats {
    pub turns_rendered: u32,
    pub turns_aborted: u32,
    pub interrupts: u32,
}

/// Asynchronous interaction shell around one `SessionEngine`.
///
/// The engine is only ever touched from this task, one event at a time, so
/// the decision core stays synchronous and deterministic.
pub struct Reactor {
    pub receiver: mpsc::Receiver<ShellEvent>,
    tx_clone: mpsc::Sender<ShellEvent>,
    state: InteractionState,
    engine: SessionEngine,
    services: Services,
    monitor: BargeInMonitor,
    interaction: InteractionConfig,
    render_timeout: Duration,
    playback: Option<ActivePlayback>,
    next_playback_id: u64,
    stats: ShellStats,
}

impl Reactor {
    pub fn new(
        receiver: mpsc::Receiver<ShellEvent>,
        tx: mpsc::Sender<ShellEvent>,
        engine: SessionEngine,
        services: Services,
        config: &EngineConfig,
    ) -> Self {
        Self {
            receiver,
            tx_clone: tx,
            state: InteractionState::Resting,
            engine,
            services,
            monitor: BargeInMonitor::new(&config.interaction),
            interaction: config.interaction.clone(),
            render_timeout: Duration::from_millis(config.renderer.timeout_ms),
            playback: None,
            next_playback_id: 0,
            stats: ShellStats::default(),
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub fn stats(&self) -> &ShellStats {
        &self.stats
    }

    /// Event loop. Returns once `Shutdown` arrives or every sender is gone;
    /// the session is ended (and written back) on the way out.
    pub async fn run(mut self) -> Result<SessionEndReport, EngineError> {
        info!("[Shell] Reactor started for session {}", self.engine.id());

        while let Some(event) = self.receiver.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }

        self.shutdown().await
    }

    /// One event, start to finish. Returns false on shutdown.
    pub async fn handle_event(&mut self, event: ShellEvent) -> bool {
        match event {
            ShellEvent::Shutdown => return false,
            ShellEvent::AudioFrame(samples) => {
                if self.state == InteractionState::Speaking {
                    self.monitor.process_frame(&samples);
                }
            }
            ShellEvent::PlaybackFinished { playback_id } => self.on_playback_finished(playback_id),
            ShellEvent::Transcript { text, audio } => self.on_transcript(text, audio).await,
        }
        true
    }

    /// Cancel playback and end the session. The write-back may block on the
    /// store, so it runs on the blocking pool.
    pub async fn shutdown(mut self) -> Result<SessionEndReport, EngineError> {
        self.stop_playback();
        info!("[Shell] Shutting down | {:?}", self.stats);
        let engine = self.engine;
        tokio::task::spawn_blocking(move || engine.end())
            .await
            .map_err(|e| EngineError::Shutdown(e.to_string()))
    }

    async fn on_transcript(&mut self, text: String, audio: Option<AudioFeatures>) {
        let control = detect_control_word(&text, &self.interaction);

        if control == Some(ControlWord::Sleep) {
            if self.apply(InteractionEvent::SleepWord) {
                self.stop_playback();
                self.engine.abort_turn();
            }
            return;
        }

        match self.state {
            InteractionState::Resting => {
                if control == Some(ControlWord::Wake) {
                    self.apply(InteractionEvent::WakeWord);
                }
            }
            InteractionState::Speaking => {
                if control == Some(ControlWord::Interrupt)
                    && self.monitor.confirm_interrupt(Instant::now())
                {
                    self.interrupt().await;
                } else {
                    debug!("[Shell] Transcript ignored while speaking");
                }
            }
            InteractionState::Listening => {
                let utterance = match audio {
                    Some(features) => Utterance::new(text, features),
                    None => Utterance::text_only(text),
                };
                self.run_turn(utterance).await;
            }
        }
    }

    async fn run_turn(&mut self, utterance: Utterance) {
        let decision = match self.engine.begin_turn(&utterance) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("[Shell] Turn rejected: {}", e);
                self.stats.turns_aborted += 1;
                return;
            }
        };

        let rendered = tokio::time::timeout(
            self.render_timeout,
            self.services.renderer.render(&decision.context),
        )
        .await;

        let reply = match rendered {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("[Shell] Renderer failed ({}); turn discarded", e);
                self.engine.abort_turn();
                self.stats.turns_aborted += 1;
                return;
            }
            Err(_) => {
                warn!("[Shell] Renderer timed out after {:?}; turn discarded", self.render_timeout);
                self.engine.abort_turn();
                self.stats.turns_aborted += 1;
                return;
            }
        };

        let report = match self.engine.complete_turn(&reply) {
            Ok(report) => report,
            Err(e) => {
                warn!("[Shell] Commit refused: {}", e);
                self.stats.turns_aborted += 1;
                return;
            }
        };
        self.stats.turns_rendered += 1;

        if report.reply.is_empty() {
            return;
        }
        if self.apply(InteractionEvent::TurnRendered) {
            self.start_playback(report.reply, decision.strategy.tts_length_scale);
        }
    }

    async fn interrupt(&mut self) {
        self.stop_playback();
        if !self.apply(InteractionEvent::InterruptConfirmed) {
            return;
        }
        self.stats.interrupts += 1;

        let ack = self.interaction.acknowledgment.clone();
        if let Err(e) = self
            .services
            .actuator
            .speak(&ack, 1.0, CancellationToken::new())
            .await
        {
            warn!("[Shell] Acknowledgment failed: {}", e);
        }
    }

    fn start_playback(&mut self, text: String, length_scale: f32) {
        self.stop_playback();
        self.next_playback_id += 1;
        let id = self.next_playback_id;

        let token = CancellationToken::new();
        let child = token.clone();
        let actuator = self.services.actuator.clone();
        let tx = self.tx_clone.clone();

        let handle = tokio::spawn(async move {
            match actuator.speak(&text, length_scale, child).await {
                Ok(Playback::Cancelled) => return,
                Ok(Playback::Completed) => {}
                Err(e) => warn!("[Shell] Playback failed: {}", e),
            }
            let _ = tx.send(ShellEvent::PlaybackFinished { playback_id: id }).await;
        });

        self.monitor.reset();
        self.playback = Some(ActivePlayback { id, token, handle });
    }

    fn stop_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.token.cancel();
            drop(playback.handle);
            self.monitor.reset();
        }
    }

    fn on_playback_finished(&mut self, playback_id: u64) {
        let current = self.playback.as_ref().map(|p| p.id);
        if current != Some(playback_id) {
            debug!("[Shell] Stale playback {} finished", playback_id);
            return;
        }
        self.playback = None;
        self.monitor.reset();
        self.apply(InteractionEvent::PlaybackFinished);
    }

    fn apply(&mut self, event: InteractionEvent) -> bool {
        match InteractionStateMachine::transition(self.state, event) {
            Some(next) => {
                info!("[Shell] {:?} --{:?}--> {:?}", self.state, event, next);
                self.state = next;
                true
            }
            None => {
                debug!("[Shell] Ignored {:?} in {:?}", event, self.state);
                false
            }
        }
    }
}
