use proptest::prelude::*;

use std::io::Write;

use regulation_engine::config::{EngineConfig, RegulationConfig};
use regulation_engine::error::{EngineError, UpdatePhase};
use regulation_engine::kernel::gate::{DifficultyGate, GateState};
use regulation_engine::kernel::mood::Mood;
use regulation_engine::kernel::regulation::RegulationState;
use regulation_engine::kernel::session::{SessionState, TurnOutcome, MAX_DIFFICULTY, MIN_DIFFICULTY};

fn session(difficulty: u8) -> SessionState {
    SessionState::new("counting", difficulty, RegulationConfig::default())
}

/// One full turn through session, regulation and gate. Returns the delta.
fn turn(s: &mut SessionState, gate: &DifficultyGate, mood: Mood, conf: f32, outcome: TurnOutcome) -> i8 {
    s.pre_decision(mood, conf).unwrap();
    let reg = RegulationState::compute(s, 5);
    let decision = gate.decide(&reg);
    s.post_response(decision.delta, outcome, "hi", "hello").unwrap();
    decision.delta
}

#[test]
fn test_post_response_before_pre_decision_is_rejected() {
    let mut s = session(2);
    let err = s.post_response(0, TurnOutcome::Success, "a", "b").unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrdering { called: UpdatePhase::PostResponse }));

    // VERIFY: nothing moved
    assert_eq!(s.turn_count(), 0);
    assert_eq!(s.current_difficulty(), 2);
    assert!(!s.is_decided());
}

#[test]
fn test_double_pre_decision_rolls_back_the_turn() {
    let mut s = session(2);
    s.pre_decision(Mood::Frustrated, 0.9).unwrap();
    s.post_response(0, TurnOutcome::Success, "a", "b").unwrap();
    assert_eq!(s.consecutive_frustration(), 1);

    s.pre_decision(Mood::Frustrated, 0.9).unwrap();
    assert_eq!(s.consecutive_frustration(), 2);

    let err = s.pre_decision(Mood::Happy, 0.9).unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrdering { called: UpdatePhase::PreDecision }));

    // VERIFY: restored to the snapshot taken before the discarded turn
    assert_eq!(s.consecutive_frustration(), 1);
    assert_eq!(s.mood(), Mood::Frustrated);
    assert!(!s.is_decided());
}

#[test]
fn test_streaks_ignore_low_confidence_and_reset_on_uncertain_moods() {
    let mut s = session(3);
    let gate = DifficultyGate::new(RegulationConfig::default());

    turn(&mut s, &gate, Mood::Sad, 0.9, TurnOutcome::Success);
    assert_eq!(s.consecutive_frustration(), 1);

    turn(&mut s, &gate, Mood::Frustrated, 0.59, TurnOutcome::Success);
    assert_eq!(s.consecutive_frustration(), 1, "weak reading must not move streaks");

    turn(&mut s, &gate, Mood::Anxious, 0.9, TurnOutcome::Success);
    assert_eq!(s.consecutive_frustration(), 0);
    assert_eq!(s.consecutive_stability(), 0);

    turn(&mut s, &gate, Mood::Happy, 0.8, TurnOutcome::Success);
    assert_eq!(s.consecutive_stability(), 1);
    assert_eq!(s.mood_confidence(), 0.8);
}

#[test]
fn test_frustration_lowers_difficulty_then_locks() {
    let mut s = session(3);
    let gate = DifficultyGate::new(RegulationConfig::default());

    assert_eq!(turn(&mut s, &gate, Mood::Frustrated, 0.7, TurnOutcome::Success), 0);
    assert_eq!(turn(&mut s, &gate, Mood::Frustrated, 0.7, TurnOutcome::Success), -1);

    // VERIFY: one step down, streaks cleared, lock engaged
    assert_eq!(s.current_difficulty(), 2);
    assert_eq!(s.difficulty_locked_turns(), 2);
    assert_eq!(s.consecutive_frustration(), 0);

    // Still frustrated, but locked: two quiet turns
    assert_eq!(turn(&mut s, &gate, Mood::Frustrated, 0.9, TurnOutcome::Success), 0);
    assert_eq!(s.difficulty_locked_turns(), 1);
    assert_eq!(turn(&mut s, &gate, Mood::Frustrated, 0.9, TurnOutcome::Success), 0);
    assert_eq!(s.difficulty_locked_turns(), 0);

    // Unlocked with a streak of 2 built during the lock
    assert_eq!(turn(&mut s, &gate, Mood::Frustrated, 0.9, TurnOutcome::Success), -1);
    assert_eq!(s.current_difficulty(), 1);
    println!("Difficulty walked 3 -> 2 -> 1 with lock honoured");
}

#[test]
fn test_increase_requires_successful_last_turn() {
    let mut s = session(2);
    let gate = DifficultyGate::new(RegulationConfig::default());

    for _ in 0..3 {
        turn(&mut s, &gate, Mood::Happy, 0.8, TurnOutcome::Failure);
    }
    assert_eq!(s.consecutive_stability(), 3);
    assert_eq!(s.current_difficulty(), 2, "failed turns never raise difficulty");

    assert_eq!(turn(&mut s, &gate, Mood::Happy, 0.8, TurnOutcome::Success), 0);
    assert_eq!(turn(&mut s, &gate, Mood::Happy, 0.8, TurnOutcome::Success), 1);
    assert_eq!(s.current_difficulty(), 3);
}

#[test]
fn test_gate_never_leaves_bounds() {
    let gate = DifficultyGate::new(RegulationConfig::default());

    let mut low = session(MIN_DIFFICULTY);
    for _ in 0..6 {
        assert_eq!(turn(&mut low, &gate, Mood::Frustrated, 1.0, TurnOutcome::Failure), 0);
    }
    assert_eq!(low.current_difficulty(), MIN_DIFFICULTY);

    let mut high = session(MAX_DIFFICULTY);
    for _ in 0..6 {
        assert_eq!(turn(&mut high, &gate, Mood::Happy, 1.0, TurnOutcome::Success), 0);
    }
    assert_eq!(high.current_difficulty(), MAX_DIFFICULTY);
}

#[test]
fn test_locked_session_refuses_delta() {
    let mut s = session(3);
    let gate = DifficultyGate::new(RegulationConfig::default());
    turn(&mut s, &gate, Mood::Sad, 0.9, TurnOutcome::Success);
    turn(&mut s, &gate, Mood::Sad, 0.9, TurnOutcome::Success);
    assert_eq!(s.difficulty_locked_turns(), 2);

    s.pre_decision(Mood::Happy, 0.9).unwrap();
    let err = s.post_response(1, TurnOutcome::Success, "a", "b").unwrap_err();
    assert!(matches!(err, EngineError::DifficultyLocked { remaining: 2 }));
    assert_eq!(s.current_difficulty(), 2);
    assert_eq!(s.turn_count(), 2);
}

#[test]
fn test_gate_state_counts_down() {
    let gate = DifficultyGate::new(RegulationConfig::default());
    let mut s = session(3);
    s.pre_decision(Mood::Neutral, 0.0).unwrap();
    let mut reg = RegulationState::compute(&s, 5);

    reg.locked_turns_remaining = 2;
    reg.difficulty_locked = true;
    let d = gate.decide(&reg);
    assert_eq!(d.delta, 0);
    assert_eq!(d.next, GateState::Locked { remaining_turns: 1 });

    reg.locked_turns_remaining = 1;
    assert_eq!(gate.decide(&reg).next, GateState::Unlocked);
}

#[test]
fn test_stored_text_is_bounded() {
    let mut s = session(2);
    let long = "x".repeat(500);
    s.pre_decision(Mood::Neutral, 0.5).unwrap();
    s.post_response(0, TurnOutcome::Success, &long, &long).unwrap();
    assert_eq!(s.last_user_input().chars().count(), 200);
    assert_eq!(s.last_response().chars().count(), 200);
}

#[test]
fn test_config_cannot_weaken_the_lock() {
    assert!(EngineConfig::default().validate().is_ok());

    for lock_turns in [0u8, 1] {
        let mut cfg = EngineConfig::default();
        cfg.regulation.lock_turns = lock_turns;
        assert!(cfg.validate().is_err(), "lock_turns {} accepted", lock_turns);
    }

    let mut cfg = EngineConfig::default();
    cfg.regulation.decision_confidence = 0.3;
    assert!(cfg.validate().is_err());

    let mut cfg = EngineConfig::default();
    cfg.regulation.lock_turns = 3;
    assert!(cfg.validate().is_ok(), "a longer lock is still safe");
}

#[test]
fn test_config_file_with_short_lock_falls_back_to_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[regulation]\nlock_turns = 0").unwrap();

    assert!(EngineConfig::load(file.path()).is_err());

    // VERIFY: the engine never runs with the weakened value
    let cfg = EngineConfig::load_or_default(file.path());
    assert_eq!(cfg.regulation.lock_turns, 2);
}

fn mood_strategy() -> impl Strategy<Value = Mood> {
    prop::sample::select(Mood::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_at_most_one_change_per_three_turns(
        start in 1u8..=5,
        turns in prop::collection::vec((mood_strategy(), 0.0f32..=1.0, any::<bool>()), 1..60)
    ) {
        let mut s = session(start);
        let gate = DifficultyGate::new(RegulationConfig::default());
        let mut changes = Vec::new();

        for (i, (mood, conf, ok)) in turns.into_iter().enumerate() {
            let outcome = if ok { TurnOutcome::Success } else { TurnOutcome::Failure };
            let before = s.current_difficulty();
            turn(&mut s, &gate, mood, conf, outcome);
            let after = s.current_difficulty();

            prop_assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&after));
            prop_assert!((after as i16 - before as i16).abs() <= 1);
            if after != before {
                changes.push(i);
            }
        }

        for pair in changes.windows(2) {
            prop_assert!(pair[1] - pair[0] >= 3, "changes at turns {} and {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn prop_regulation_is_a_pure_projection(
        turns in prop::collection::vec((mood_strategy(), 0.0f32..=1.0), 0..20)
    ) {
        let mut s = session(3);
        for (mood, conf) in turns {
            s.pre_decision(mood, conf).unwrap();
            s.post_response(0, TurnOutcome::Success, "", "").unwrap();
        }
        let a = RegulationState::compute(&s, 5);
        let b = RegulationState::compute(&s, 5);
        prop_assert_eq!(&a, &b);
        prop_assert!((0.0..=1.0).contains(&a.frustration_persistence));
        prop_assert!((0.0..=1.0).contains(&a.stability_persistence));
        prop_assert!((-1.0..=1.0).contains(&a.emotional_trend_score));
    }
}
