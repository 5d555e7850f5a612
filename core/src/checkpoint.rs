//! Durable checkpoints: bundle format, atomic write, validated read,
//! and the every-N-ticks policy wrapper.
//!
//! A bundle is written to a hidden temp file in the target directory,
//! flushed and synced, then renamed over its final name. Readers never
//! observe a partially written checkpoint.

use crate::{
    config::SimConfig,
    error::CheckpointError,
    history::HistoryStack,
    types::{RunId, Tick},
    world::WorldState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// Bumped whenever the bundle layout changes incompatibly.
pub const CHECKPOINT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "checkpoint-";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_id: Uuid,
    pub run_id:        RunId,
    pub tick:          Tick,
    pub created_at:    DateTime<Utc>,
    pub label:         String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointBundle {
    pub version:  u32,
    pub metadata: CheckpointMetadata,
    pub config:   SimConfig,
    pub world:    WorldState,
}

impl CheckpointBundle {
    pub fn new(world: WorldState, config: SimConfig, label: impl Into<String>) -> Self {
        Self {
            version:  CHECKPOINT_VERSION,
            metadata: CheckpointMetadata {
                checkpoint_id: Uuid::new_v4(),
                run_id:        config.run_id.clone(),
                tick:          world.tick(),
                created_at:    Utc::now(),
                label:         label.into(),
            },
            config,
            world,
        }
    }
}

impl HistoryStack {
    /// A fresh stack whose root is the checkpointed state.
    pub fn from_bundle(bundle: CheckpointBundle) -> Self {
        HistoryStack::new(bundle.world)
    }
}

pub fn checkpoint_file_name(tick: Tick) -> String {
    format!("{FILE_PREFIX}{tick:010}{FILE_SUFFIX}")
}

/// Atomically write `bundle` into `dir`. Returns the final path.
pub fn write_bundle(dir: &Path, bundle: &CheckpointBundle) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;

    let name = checkpoint_file_name(bundle.metadata.tick);
    let final_path = dir.join(&name);
    let tmp_path = dir.join(format!(".{name}.{}.tmp", bundle.metadata.checkpoint_id));

    let bytes = serde_json::to_vec_pretty(bundle)
        .map_err(|e| CheckpointError::Validation(format!("cannot serialize bundle: {e}")))?;

    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.flush()?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(CheckpointError::io(&tmp_path, e));
    }

    if let Err(e) = fs::rename(&tmp_path, &final_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(CheckpointError::io(&final_path, e));
    }

    // Persist the rename itself. Not every platform can open a directory.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(final_path)
}

/// Read and validate a bundle: version first, then structure and value
/// invariants, then graph invariants.
pub fn read_bundle(path: &Path) -> Result<CheckpointBundle, CheckpointError> {
    let bytes = fs::read(path).map_err(|e| CheckpointError::io(path, e))?;

    let doc: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| CheckpointError::Validation(format!("malformed checkpoint: {e}")))?;

    let found = doc
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);
    if found != CHECKPOINT_VERSION {
        return Err(CheckpointError::Schema { expected: CHECKPOINT_VERSION, found });
    }

    let bundle: CheckpointBundle = serde_json::from_value(doc)
        .map_err(|e| CheckpointError::Validation(e.to_string()))?;

    bundle
        .world
        .validate()
        .map_err(|e| CheckpointError::Validation(e.to_string()))?;
    if bundle.metadata.tick != bundle.world.tick() {
        return Err(CheckpointError::Validation(format!(
            "metadata tick {} does not match state tick {}",
            bundle.metadata.tick,
            bundle.world.tick()
        )));
    }
    bundle
        .config
        .validate()
        .map_err(|e| CheckpointError::Validation(e.to_string()))?;

    Ok(bundle)
}

/// Path of the highest-tick checkpoint in `dir`, if any.
pub fn latest_in(dir: &Path) -> Result<Option<PathBuf>, CheckpointError> {
    let entries = fs::read_dir(dir).map_err(|e| CheckpointError::io(dir, e))?;
    let mut latest: Option<(Tick, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| CheckpointError::io(dir, e))?;
        let file_name = entry.file_name();
        let Some(tick) = file_name
            .to_str()
            .and_then(|n| n.strip_prefix(FILE_PREFIX))
            .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            .and_then(|n| n.parse::<Tick>().ok())
        else {
            continue;
        };
        if latest.as_ref().is_none_or(|(best, _)| tick > *best) {
            latest = Some((tick, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Serializes writes into one directory so two writers never race on
/// the temp-file rename.
#[derive(Debug)]
pub struct CheckpointWriter {
    dir:  PathBuf,
    lock: Mutex<()>,
}

impl CheckpointWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), lock: Mutex::new(()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, bundle: &CheckpointBundle) -> Result<PathBuf, CheckpointError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_bundle(&self.dir, bundle)
    }
}

/// Writes a checkpoint every `interval` committed ticks.
///
/// A failed write is logged and counted, never returned: the countdown
/// resets and the next interval tries again.
#[derive(Debug)]
pub struct AutoCheckpointer {
    interval:     Tick,
    countdown:    Tick,
    writer:       Arc<CheckpointWriter>,
    writes:       u64,
    failures:     u64,
    last_written: Option<PathBuf>,
}

impl AutoCheckpointer {
    /// An interval of 0 is treated as 1.
    pub fn new(interval: Tick, writer: Arc<CheckpointWriter>) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            countdown: interval,
            writer,
            writes: 0,
            failures: 0,
            last_written: None,
        }
    }

    /// Line the countdown up with `tick`, so the next write lands on the
    /// next multiple of the interval. Call whenever history is replaced or
    /// moved.
    pub fn realign(&mut self, tick: Tick) {
        self.countdown = self.interval - tick % self.interval;
    }

    /// Call once per committed tick.
    pub fn on_commit(&mut self, world: &WorldState, config: &SimConfig) -> Option<PathBuf> {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return None;
        }
        self.countdown = self.interval;

        let bundle = CheckpointBundle::new(world.clone(), config.clone(), format!("auto@{}", world.tick()));
        match self.writer.write(&bundle) {
            Ok(path) => {
                log::info!("tick={} checkpoint written to {}", world.tick(), path.display());
                self.writes += 1;
                self.last_written = Some(path.clone());
                Some(path)
            }
            Err(e) => {
                log::warn!("tick={} checkpoint failed, retrying next interval: {e}", world.tick());
                self.failures += 1;
                None
            }
        }
    }

    pub fn interval(&self) -> Tick {
        self.interval
    }

    pub fn writer(&self) -> &Arc<CheckpointWriter> {
        &self.writer
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }
}
