use crate::{
    relationship::EdgeType,
    entity::EntityRole,
    types::{EntityId, Tick},
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    GraphConsistency(#[from] GraphConsistencyError),

    #[error("Invalid value: {0}")]
    Value(#[from] ValueError),

    #[error("System '{system}' failed at tick {tick}: {reason}")]
    SystemExecution { system: String, tick: Tick, reason: String },

    #[error("Interceptor '{interceptor}' failed at tick {tick}: {reason}")]
    InterceptorExecution { interceptor: String, tick: Tick, reason: String },

    #[error(transparent)]
    HistoryBounds(#[from] HistoryBoundsError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;

/// Malformed entity or edge references. Raised at construction and
/// during fold; never silently repaired.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphConsistencyError {
    #[error("Duplicate entity key '{0}'")]
    DuplicateEntity(EntityId),

    #[error("Duplicate {edge_type:?} edge {source_id} -> {target_id}")]
    DuplicateRelationship { source_id: EntityId, target_id: EntityId, edge_type: EdgeType },

    #[error("{edge_type:?} edge references unknown entity '{missing}'")]
    UnknownEndpoint { edge_type: EdgeType, missing: EntityId },

    #[error("Self-loop on '{0}'")]
    SelfLoop(EntityId),

    #[error("{edge_type:?} edge may not run from {source_role:?} to {target_role:?}")]
    RoleMismatch { edge_type: EdgeType, source_role: EntityRole, target_role: EntityRole },

    #[error("Unknown entity '{0}'")]
    UnknownEntity(EntityId),

    #[error("{kind} event from tick {event_tick} stored in state of tick {state_tick}")]
    StaleEvent { kind: &'static str, event_tick: Tick, state_tick: Tick },

    #[error("Entity '{entity}' has no {component} component")]
    MissingComponent { entity: EntityId, component: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("{kind} must be finite")]
    NotFinite { kind: &'static str },

    #[error("{kind} {value} outside [{min}, {max}]")]
    OutOfRange { kind: &'static str, value: f64, min: f64, max: f64 },

    #[error("{kind} underflow: {lhs} - {rhs} < 0")]
    Underflow { kind: &'static str, lhs: f64, rhs: f64 },

    #[error("Precision of {digits} digits exceeds the {max}-digit value grid")]
    Precision { digits: u32, max: u32 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBoundsError {
    #[error("Cannot undo past the root of history")]
    AtRoot,

    #[error("Nothing to redo")]
    NoRedo,
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint schema mismatch: expected version {expected}, found {found}")]
    Schema { expected: u32, found: u32 },

    #[error("Checkpoint validation failed: {0}")]
    Validation(String),
}

impl CheckpointError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Render a caught panic payload for logging and error reports.
pub(crate) fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
