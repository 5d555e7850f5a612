//! Shared primitive types used across the entire simulation.

/// A simulation tick. Tick 0 is the genesis state.
pub type Tick = u64;

/// A stable, unique identifier for any entity in the world graph.
pub type EntityId = String;

/// The canonical run identifier.
pub type RunId = String;
