//! Undo and redo through the simulation facade.

use dialectic_core::{
    config::SimConfig,
    engine::Simulation,
    error::{HistoryBoundsError, SimError},
    scenario::Scenario,
};

fn sim() -> Simulation {
    Simulation::new(SimConfig::default_test(), Scenario::company_town().genesis().unwrap()).unwrap()
}

#[test]
fn undo_then_redo_restores_the_same_state() {
    let mut sim = sim();
    sim.run_ticks(3).unwrap();
    let at_three = sim.current().clone();

    let back = sim.undo().unwrap().clone();
    assert_eq!(back.tick(), 2);
    assert_ne!(back, at_three);

    let forward = sim.redo().unwrap().clone();
    assert_eq!(forward, at_three, "redo must restore the exact state that was undone");
}

#[test]
fn undo_at_root_is_an_error_and_leaves_state_alone() {
    let mut sim = sim();
    let genesis = sim.current().clone();

    let err = sim.undo().unwrap_err();
    assert!(matches!(err, SimError::HistoryBounds(HistoryBoundsError::AtRoot)));
    assert_eq!(sim.current(), &genesis);

    let err = sim.redo().unwrap_err();
    assert!(matches!(err, SimError::HistoryBounds(HistoryBoundsError::NoRedo)));
}

#[test]
fn ticking_after_undo_discards_the_redo_tail() {
    let mut sim = sim();
    sim.run_ticks(4).unwrap();
    sim.undo().unwrap();
    sim.undo().unwrap();
    assert_eq!(sim.history().redo_len(), 2);

    sim.step().unwrap();
    assert_eq!(sim.current().tick(), 3);
    assert!(!sim.history().can_redo());
    assert_eq!(sim.history().len(), 4);
}

#[test]
fn replaying_after_undo_reproduces_the_same_tick() {
    let mut sim = sim();
    sim.run_ticks(5).unwrap();
    let original = sim.current().clone();

    sim.undo().unwrap();
    sim.step().unwrap();
    assert_eq!(sim.current(), &original, "same seed and same prior state must give the same tick");
}

#[test]
fn bounded_history_keeps_only_the_most_recent_states() {
    let mut config = SimConfig::default_test();
    config.history_depth = Some(3);
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(10).unwrap();

    assert_eq!(sim.history().len(), 3);
    sim.undo().unwrap();
    sim.undo().unwrap();
    assert_eq!(sim.current().tick(), 8);
    assert!(sim.undo().is_err(), "evicted states must not be reachable");
}
