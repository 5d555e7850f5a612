//! dialectic-core: a deterministic tick engine for simulations of
//! interacting entities.
//!
//! A run is a sequence of immutable `WorldState` snapshots. Each tick,
//! registered systems propose deltas and events against the last
//! committed state, interceptors may block or rewrite those events,
//! and the survivors fold into the next snapshot, which is pushed onto
//! an undoable history and optionally checkpointed to disk.

pub mod bus;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod graph;
pub mod history;
pub mod intercept;
pub mod quantize;
pub mod relationship;
pub mod rng;
pub mod scenario;
pub mod store;
pub mod system;
pub mod systems;
pub mod types;
pub mod value;
pub mod world;
