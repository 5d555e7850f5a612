//! Checkpoint bundles: atomic write, validated read, resume and the
//! every-N-ticks policy.

use dialectic_core::{
    checkpoint::{
        checkpoint_file_name, latest_in, read_bundle, write_bundle, CheckpointBundle, CheckpointWriter,
        CHECKPOINT_VERSION,
    },
    config::SimConfig,
    engine::Simulation,
    error::{CheckpointError, SimError},
    history::HistoryStack,
    scenario::Scenario,
};
use std::{fs, path::Path, sync::Arc, thread};
use tempfile::TempDir;

fn ran(ticks: u64) -> Simulation {
    let mut sim = Simulation::new(SimConfig::default_test(), Scenario::company_town().genesis().unwrap())
        .unwrap();
    sim.run_ticks(ticks).unwrap();
    sim
}

fn rewrite(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut doc: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    edit(&mut doc);
    fs::write(path, serde_json::to_vec(&doc).unwrap()).unwrap();
}

#[test]
fn bundle_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let sim = ran(7);
    let bundle = CheckpointBundle::new(sim.current().clone(), sim.config().clone(), "manual");

    let path = write_bundle(dir.path(), &bundle).unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), checkpoint_file_name(7));

    let back = read_bundle(&path).unwrap();
    assert_eq!(back.version, CHECKPOINT_VERSION);
    assert_eq!(back.metadata.tick, 7);
    assert_eq!(back.metadata.label, "manual");
    assert_eq!(back.config, *sim.config());
    assert_eq!(back.world, *sim.current());

    let stack = HistoryStack::from_bundle(back);
    assert_eq!(stack.current(), sim.current());
    assert!(!stack.can_undo());
}

#[test]
fn atomic_write_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(0, dir.path());
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(2).unwrap();
    sim.checkpoint_now("a").unwrap();
    sim.step().unwrap();
    sim.checkpoint_now("b").unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.ends_with(".tmp")), "leftover temp files: {names:?}");
    assert_eq!(names.len(), 2);
}

#[test]
fn schema_mismatch_is_reported_with_both_versions() {
    let dir = TempDir::new().unwrap();
    let sim = ran(1);
    let path = write_bundle(dir.path(), &CheckpointBundle::new(sim.current().clone(), sim.config().clone(), "x"))
        .unwrap();

    rewrite(&path, |doc| doc["version"] = serde_json::json!(99));
    match read_bundle(&path) {
        Err(CheckpointError::Schema { expected, found }) => {
            assert_eq!(expected, CHECKPOINT_VERSION);
            assert_eq!(found, 99);
        }
        other => panic!("expected Schema error, got {other:?}"),
    }
}

#[test]
fn dangling_edge_fails_validation() {
    let dir = TempDir::new().unwrap();
    let sim = ran(1);
    let path = write_bundle(dir.path(), &CheckpointBundle::new(sim.current().clone(), sim.config().clone(), "x"))
        .unwrap();

    rewrite(&path, |doc| {
        doc["world"]["graph"]["relationships"][0]["target"] = serde_json::json!("ghost");
    });
    assert!(matches!(read_bundle(&path), Err(CheckpointError::Validation(_))));
}

#[test]
fn out_of_range_value_fails_validation() {
    let dir = TempDir::new().unwrap();
    let sim = ran(1);
    let path = write_bundle(dir.path(), &CheckpointBundle::new(sim.current().clone(), sim.config().clone(), "x"))
        .unwrap();

    rewrite(&path, |doc| {
        let entities = doc["world"]["graph"]["entities"].as_array_mut().unwrap();
        let worker = entities
            .iter_mut()
            .find(|e| e["id"] == "w-ana")
            .unwrap();
        worker["components"]["material"]["wealth"] = serde_json::json!(-5.0);
    });
    assert!(matches!(read_bundle(&path), Err(CheckpointError::Validation(_))));
}

#[test]
fn truncated_file_is_not_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(checkpoint_file_name(3));
    fs::write(&path, br#"{"version": 1, "metadata": {"#).unwrap();
    assert!(matches!(read_bundle(&path), Err(CheckpointError::Validation(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = read_bundle(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, CheckpointError::Io { .. }));
}

#[test]
fn resume_continues_identically() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(0, dir.path());

    let mut uninterrupted = Simulation::new(config.clone(), Scenario::company_town().genesis().unwrap()).unwrap();
    uninterrupted.run_ticks(20).unwrap();
    let path = uninterrupted.checkpoint_now("mid").unwrap();
    uninterrupted.run_ticks(15).unwrap();

    let mut resumed = Simulation::from_checkpoint(&path).unwrap();
    assert_eq!(resumed.current().tick(), 20);
    resumed.run_ticks(15).unwrap();

    assert_eq!(resumed.current(), uninterrupted.current());
    assert_eq!(
        resumed.current().digest().unwrap(),
        uninterrupted.current().digest().unwrap()
    );
}

#[test]
fn restore_replaces_history_with_the_checkpointed_state() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(0, dir.path());
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();

    sim.run_ticks(5).unwrap();
    let path = sim.checkpoint_now("five").unwrap();
    let at_five = sim.current().clone();
    sim.run_ticks(5).unwrap();

    let restored = sim.restore(&path).unwrap().clone();
    assert_eq!(restored, at_five);
    assert_eq!(sim.history().len(), 1);
    assert!(matches!(sim.undo(), Err(SimError::HistoryBounds(_))));
}

#[test]
fn auto_checkpoint_writes_on_each_interval() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(10, dir.path());
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(25).unwrap();

    let checkpointer = sim.checkpointer().expect("interval > 0 enables checkpointing");
    assert_eq!(checkpointer.writes(), 2);
    assert_eq!(checkpointer.failures(), 0);
    assert!(dir.path().join(checkpoint_file_name(10)).exists());
    assert!(dir.path().join(checkpoint_file_name(20)).exists());
    assert!(!dir.path().join(checkpoint_file_name(25)).exists());

    let latest = latest_in(dir.path()).unwrap().unwrap();
    assert_eq!(latest, dir.path().join(checkpoint_file_name(20)));
    assert_eq!(checkpointer.last_written(), Some(latest.as_path()));
    assert_eq!(read_bundle(&latest).unwrap().metadata.label, "auto@20");
}

#[test]
fn restore_realigns_the_checkpoint_interval() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(10, dir.path());
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(15).unwrap();
    let path = sim.checkpoint_now("mid").unwrap();
    sim.run_ticks(2).unwrap();

    sim.restore(&path).unwrap();
    sim.run_ticks(5).unwrap();

    assert_eq!(sim.current().tick(), 20);
    assert!(dir.path().join(checkpoint_file_name(20)).exists());
    assert!(!dir.path().join(checkpoint_file_name(18)).exists());
    assert_eq!(sim.checkpointer().unwrap().writes(), 2);
}

#[test]
fn undo_realigns_the_checkpoint_interval() {
    let dir = TempDir::new().unwrap();
    let config = SimConfig::default_test().with_checkpoints(10, dir.path());
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(9).unwrap();
    sim.undo().unwrap();
    sim.run_ticks(1).unwrap();
    assert!(!dir.path().join(checkpoint_file_name(9)).exists());

    sim.run_ticks(1).unwrap();
    assert!(dir.path().join(checkpoint_file_name(10)).exists());
    assert_eq!(sim.checkpointer().unwrap().writes(), 1);
}

#[test]
fn concurrent_writes_through_one_writer_stay_whole() {
    let dir = TempDir::new().unwrap();
    let writer = Arc::new(CheckpointWriter::new(dir.path()));
    let early = ran(3);
    let late = ran(4);
    let bundles = [
        CheckpointBundle::new(early.current().clone(), early.config().clone(), "early"),
        CheckpointBundle::new(late.current().clone(), late.config().clone(), "late"),
    ];

    let handles: Vec<_> = (0..2)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            let bundles = bundles.clone();
            thread::spawn(move || {
                for round in 0..10 {
                    writer.write(&bundles[(worker + round) % 2]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec![checkpoint_file_name(3), checkpoint_file_name(4)], "leftover files: {names:?}");

    assert_eq!(read_bundle(&dir.path().join(checkpoint_file_name(3))).unwrap().world, *early.current());
    assert_eq!(read_bundle(&dir.path().join(checkpoint_file_name(4))).unwrap().world, *late.current());
}

#[test]
fn failed_auto_checkpoint_never_fails_the_tick() {
    let dir = TempDir::new().unwrap();
    // A regular file where the checkpoint directory should be.
    let blocked = dir.path().join("not-a-dir");
    fs::write(&blocked, b"occupied").unwrap();

    let config = SimConfig::default_test().with_checkpoints(10, &blocked);
    let mut sim = Simulation::new(config, Scenario::company_town().genesis().unwrap()).unwrap();
    sim.run_ticks(25).unwrap();

    assert_eq!(sim.current().tick(), 25);
    let checkpointer = sim.checkpointer().unwrap();
    assert_eq!(checkpointer.writes(), 0);
    assert_eq!(checkpointer.failures(), 2, "each interval retries the write");
}

#[test]
fn latest_in_ignores_unrelated_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
    fs::write(dir.path().join(".checkpoint-0000000099.json.abc.tmp"), b"{}").unwrap();
    assert_eq!(latest_in(dir.path()).unwrap(), None);

    let sim = ran(3);
    let path = write_bundle(dir.path(), &CheckpointBundle::new(sim.current().clone(), sim.config().clone(), "x"))
        .unwrap();
    assert_eq!(latest_in(dir.path()).unwrap(), Some(path));
}
