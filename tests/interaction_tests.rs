use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use regulation_engine::config::{EngineConfig, InteractionConfig};
use regulation_engine::error::EngineError;
use regulation_engine::kernel::audio::monitor::{BargeInMonitor, FrameSignal};
use regulation_engine::kernel::interaction::{
    detect_control_word, ControlWord, InteractionEvent, InteractionState, InteractionStateMachine,
};
use regulation_engine::kernel::pipeline::{RenderContext, SessionEngine};
use regulation_engine::kernel::reactor::{Reactor, ShellEvent};
use regulation_engine::memory::{InMemoryUserStore, UserStore};
use regulation_engine::services::{compose_prompt, Actuator, Playback, Renderer, Services};

// ============================================================================
// Test doubles
// ============================================================================

struct FixedRenderer(&'static str);

#[async_trait]
impl Renderer for FixedRenderer {
    async fn render(&self, _context: &RenderContext) -> Result<String, EngineError> {
        Ok(self.0.to_string())
    }
}

struct FailingRenderer;

#[async_trait]
impl Renderer for FailingRenderer {
    async fn render(&self, _context: &RenderContext) -> Result<String, EngineError> {
        Err(EngineError::Render("model offline".into()))
    }
}

struct SlowRenderer;

#[async_trait]
impl Renderer for SlowRenderer {
    async fn render(&self, _context: &RenderContext) -> Result<String, EngineError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("Too late.".into())
    }
}

/// Records what was spoken. Long replies play until cancelled; short ones
/// (the acknowledgment) complete at once.
#[derive(Default)]
struct RecordingActuator {
    spoken: Mutex<Vec<String>>,
    finish_immediately: bool,
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn speak(&self, text: &str, _scale: f32, cancel: CancellationToken) -> Result<Playback, EngineError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.finish_immediately || text == "Okay, I'm listening." {
            return Ok(Playback::Completed);
        }
        cancel.cancelled().await;
        Ok(Playback::Cancelled)
    }
}

fn reactor_with(
    renderer: Arc<dyn Renderer>,
    actuator: Arc<RecordingActuator>,
    config: EngineConfig,
) -> (Reactor, Arc<InMemoryUserStore>) {
    let store = Arc::new(InMemoryUserStore::new());
    let engine = SessionEngine::start("child", "counting", store.clone(), config.clone());
    let (tx, rx) = mpsc::channel(32);
    let services = Services { renderer, actuator };
    (Reactor::new(rx, tx, engine, services, &config), store)
}

fn transcript(text: &str) -> ShellEvent {
    ShellEvent::Transcript { text: text.to_string(), audio: None }
}

fn loud_frame() -> ShellEvent {
    ShellEvent::AudioFrame(vec![0.1; 160])
}

// ============================================================================
// Pure pieces
// ============================================================================

#[test]
fn test_interaction_transitions() {
    use InteractionEvent::*;
    use InteractionState::*;

    assert_eq!(InteractionStateMachine::transition(Resting, WakeWord), Some(Listening));
    assert_eq!(InteractionStateMachine::transition(Listening, TurnRendered), Some(Speaking));
    assert_eq!(InteractionStateMachine::transition(Speaking, PlaybackFinished), Some(Listening));
    assert_eq!(InteractionStateMachine::transition(Speaking, InterruptConfirmed), Some(Listening));
    assert_eq!(InteractionStateMachine::transition(Speaking, SleepWord), Some(Resting));
    assert_eq!(InteractionStateMachine::transition(Listening, SleepWord), Some(Resting));

    // VERIFY: everything else is ignored
    assert_eq!(InteractionStateMachine::transition(Resting, TurnRendered), None);
    assert_eq!(InteractionStateMachine::transition(Resting, InterruptConfirmed), None);
    assert_eq!(InteractionStateMachine::transition(Listening, InterruptConfirmed), None);
    assert_eq!(InteractionStateMachine::transition(Listening, WakeWord), None);
    assert_eq!(InteractionStateMachine::transition(Resting, SleepWord), None);
}

#[test]
fn test_control_words_match_whole_words() {
    let config = InteractionConfig::default();
    assert_eq!(detect_control_word("Hey Friday!", &config), Some(ControlWord::Wake));
    assert_eq!(detect_control_word("STOP", &config), Some(ControlWord::Interrupt));
    assert_eq!(detect_control_word("wait, shutdown now", &config), Some(ControlWord::Sleep));
    assert_eq!(detect_control_word("the bus stopped", &config), None);
    assert_eq!(detect_control_word("", &config), None);
}

#[test]
fn test_barge_in_needs_sustained_speech() {
    let mut monitor = BargeInMonitor::new(&InteractionConfig::default());
    let loud = vec![0.1f32; 160];
    let quiet = vec![0.001f32; 160];

    for _ in 0..9 {
        assert_eq!(monitor.process_frame(&loud), None);
    }
    assert!(!monitor.confirm_interrupt(Instant::now()), "9 frames are not enough");

    // A single quiet frame restarts the count
    assert_eq!(monitor.process_frame(&quiet), Some(FrameSignal::Reset));
    for _ in 0..9 {
        monitor.process_frame(&loud);
    }
    assert_eq!(monitor.process_frame(&loud), Some(FrameSignal::Armed));
    assert!(monitor.is_armed());

    let t = Instant::now();
    assert!(monitor.confirm_interrupt(t));
    assert!(!monitor.is_armed());

    // Re-armed, but inside the cooldown
    for _ in 0..10 {
        monitor.process_frame(&loud);
    }
    assert!(!monitor.confirm_interrupt(t + Duration::from_millis(500)));
    assert!(monitor.confirm_interrupt(t + Duration::from_millis(1000)));
}

#[test]
fn test_armed_monitor_survives_trailing_silence() {
    let mut monitor = BargeInMonitor::new(&InteractionConfig::default());
    let loud = vec![0.1f32; 160];
    let quiet = vec![0.001f32; 160];
    let t = Instant::now();

    for i in 0..10u64 {
        monitor.process_frame_at(&loud, t + Duration::from_millis(30 * i));
    }
    let last_voice = t + Duration::from_millis(270);

    // Child stops talking; the transcript arrives a moment later
    for i in 1..=10u64 {
        monitor.process_frame_at(&quiet, last_voice + Duration::from_millis(30 * i));
    }
    assert_eq!(monitor.consecutive_frames(), 0);
    assert!(monitor.is_armed_at(last_voice + Duration::from_millis(600)));

    let mut late = BargeInMonitor::new(&InteractionConfig::default());
    for i in 0..10u64 {
        late.process_frame_at(&loud, t + Duration::from_millis(30 * i));
    }
    late.process_frame_at(&quiet, last_voice + Duration::from_millis(30));

    // VERIFY: inside the latch the keyword counts, past it it does not
    assert!(monitor.confirm_interrupt(last_voice + Duration::from_millis(600)));
    assert!(!late.confirm_interrupt(last_voice + Duration::from_millis(1500)));
}

#[tokio::test]
async fn test_prompt_carries_strategy_and_style() {
    let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    let mut engine = SessionEngine::start("child", "shapes", store, EngineConfig::default());
    let decision = engine
        .begin_turn(&regulation_engine::kernel::fusion::Utterance::text_only("I love circles"))
        .unwrap();

    let prompt = compose_prompt(&decision.context);
    assert!(prompt.starts_with("System:"));
    assert!(prompt.contains("Topic: shapes at level 1/5"));
    assert!(prompt.contains(decision.style.prompt()));
    assert!(prompt.ends_with("User: I love circles\nAssistant:"));
}

// ============================================================================
// Reactor
// ============================================================================

#[tokio::test]
async fn test_wake_turn_and_playback_cycle() {
    let actuator = Arc::new(RecordingActuator { finish_immediately: true, ..Default::default() });
    let (mut reactor, _store) = reactor_with(
        Arc::new(FixedRenderer("Let us count to three.")),
        actuator.clone(),
        EngineConfig::default(),
    );
    assert_eq!(reactor.state(), InteractionState::Resting);

    // Speech before the wake word is ignored
    reactor.handle_event(transcript("hello there")).await;
    assert_eq!(reactor.state(), InteractionState::Resting);
    assert_eq!(reactor.engine().session().turn_count(), 0);

    reactor.handle_event(transcript("friday")).await;
    assert_eq!(reactor.state(), InteractionState::Listening);

    reactor.handle_event(transcript("can we count apples")).await;
    assert_eq!(reactor.state(), InteractionState::Speaking);
    assert_eq!(reactor.engine().session().turn_count(), 1);

    // Playback task reports back through the channel
    let finished = tokio::time::timeout(Duration::from_secs(1), reactor.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(finished, ShellEvent::PlaybackFinished { .. }));
    reactor.handle_event(finished).await;

    // VERIFY: back to listening, reply was spoken
    assert_eq!(reactor.state(), InteractionState::Listening);
    assert_eq!(actuator.spoken.lock().unwrap().as_slice(), ["Let us count to three."]);

    reactor.handle_event(transcript("shutdown")).await;
    assert_eq!(reactor.state(), InteractionState::Resting);
    println!("Shell cycled Resting -> Listening -> Speaking -> Listening -> Resting");
}

#[tokio::test]
async fn test_confirmed_interrupt_cancels_playback_and_acknowledges() {
    let actuator = Arc::new(RecordingActuator::default());
    let (mut reactor, _store) = reactor_with(
        Arc::new(FixedRenderer("Let us count the blocks together.")),
        actuator.clone(),
        EngineConfig::default(),
    );

    reactor.handle_event(transcript("friday")).await;
    reactor.handle_event(transcript("what shall we do now")).await;
    assert_eq!(reactor.state(), InteractionState::Speaking);

    // Keyword without sustained speech: ignored
    reactor.handle_event(transcript("stop")).await;
    assert_eq!(reactor.state(), InteractionState::Speaking);

    for _ in 0..10 {
        reactor.handle_event(loud_frame()).await;
    }
    reactor.handle_event(transcript("stop")).await;

    // VERIFY: listening again, acknowledgment spoken, turn kept
    assert_eq!(reactor.state(), InteractionState::Listening);
    assert_eq!(reactor.stats().interrupts, 1);
    let spoken = actuator.spoken.lock().unwrap().clone();
    assert_eq!(spoken.last().map(String::as_str), Some("Okay, I'm listening."));
    assert_eq!(reactor.engine().session().turn_count(), 1);
}

#[tokio::test]
async fn test_interrupt_after_child_stops_talking() {
    let actuator = Arc::new(RecordingActuator::default());
    let (mut reactor, _store) = reactor_with(
        Arc::new(FixedRenderer("Let us count the blocks together.")),
        actuator.clone(),
        EngineConfig::default(),
    );

    reactor.handle_event(transcript("friday")).await;
    reactor.handle_event(transcript("what shall we do now")).await;
    for _ in 0..10 {
        reactor.handle_event(loud_frame()).await;
    }
    // Trailing silence before the transcript lands
    for _ in 0..5 {
        reactor.handle_event(ShellEvent::AudioFrame(vec![0.0; 160])).await;
    }
    reactor.handle_event(transcript("stop")).await;

    assert_eq!(reactor.state(), InteractionState::Listening);
    assert_eq!(reactor.stats().interrupts, 1);
}

#[tokio::test]
async fn test_shutdown_writes_back_off_the_async_worker() {
    let actuator = Arc::new(RecordingActuator::default());
    let (mut reactor, store) = reactor_with(
        Arc::new(FixedRenderer("Let us count the blocks together.")),
        actuator,
        EngineConfig::default(),
    );
    reactor.handle_event(transcript("friday")).await;
    reactor.handle_event(transcript("what shall we do now")).await;

    // Playback is still running; shutdown cancels it and persists
    let report = reactor.shutdown().await.unwrap();
    assert_eq!(report.turns, 1);
    assert!(store.load_record("child").unwrap().is_some());
}

#[tokio::test]
async fn test_renderer_failure_discards_turn() {
    let actuator = Arc::new(RecordingActuator::default());
    let (mut reactor, _store) = reactor_with(Arc::new(FailingRenderer), actuator.clone(), EngineConfig::default());

    reactor.handle_event(transcript("friday")).await;
    reactor.handle_event(transcript("I can't do this, it is too hard and wrong")).await;

    assert_eq!(reactor.state(), InteractionState::Listening);
    assert_eq!(reactor.stats().turns_aborted, 1);
    assert_eq!(reactor.engine().session().turn_count(), 0);
    assert!(!reactor.engine().session().is_decided());
    assert!(actuator.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_renderer_timeout_discards_turn() {
    let mut config = EngineConfig::default();
    config.renderer.timeout_ms = 50;
    let actuator = Arc::new(RecordingActuator::default());
    let (mut reactor, _store) = reactor_with(Arc::new(SlowRenderer), actuator, config);

    reactor.handle_event(transcript("friday")).await;
    let started = Instant::now();
    reactor.handle_event(transcript("count with me please")).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(reactor.state(), InteractionState::Listening);
    assert_eq!(reactor.stats().turns_aborted, 1);
    assert_eq!(reactor.engine().session().turn_count(), 0);
}

#[tokio::test]
async fn test_run_loop_ends_session_on_shutdown() {
    let actuator = Arc::new(RecordingActuator { finish_immediately: true, ..Default::default() });
    let store = Arc::new(InMemoryUserStore::new());
    let config = EngineConfig::default();
    let engine = SessionEngine::start("child", "counting", store.clone(), config.clone());
    let (tx, rx) = mpsc::channel(32);
    let services = Services {
        renderer: Arc::new(FixedRenderer("Good job.")),
        actuator,
    };
    let reactor = Reactor::new(rx, tx.clone(), engine, services, &config);
    let handle = tokio::spawn(reactor.run());

    tx.send(transcript("friday")).await.unwrap();
    tx.send(transcript("one two three four")).await.unwrap();
    tx.send(ShellEvent::Shutdown).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.turns, 1);
    assert!(store.load_record("child").unwrap().is_some());
}
