//! Typed records of what happened during a tick transition.
//!
//! RULE: Events are pure data. The fold step in `engine` decides what
//! each state-affecting variant does to the world; observers and the
//! event log only read them.

use crate::{
    quantize::{Quantize, Quantizer},
    types::{EntityId, RunId, Tick},
    value::{Coefficient, Currency, Intensity, Probability},
};
use serde::{Deserialize, Serialize};

/// Every event a tick can produce. `tick` is the tick of the state the
/// event was folded into.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // ── Value flows ────────────────────────────────
    Extraction {
        tick:   Tick,
        source: EntityId,
        target: EntityId,
        amount: Currency,
    },
    WagePaid {
        tick:     Tick,
        employer: EntityId,
        worker:   EntityId,
        amount:   Currency,
    },
    RentCollected {
        tick:     Tick,
        tenant:   EntityId,
        landlord: EntityId,
        amount:   Currency,
    },
    Eviction {
        tick:     Tick,
        tenant:   EntityId,
        landlord: EntityId,
    },

    // ── Consciousness and struggle ─────────────────
    Spark {
        tick:      Tick,
        entity:    EntityId,
        intensity: Intensity,
    },
    ConsciousnessRaised {
        tick:   Tick,
        entity: EntityId,
        level:  Probability,
    },
    Uprising {
        tick:         Tick,
        entity:       EntityId,
        mobilization: Probability,
    },
    SolidarityFormed {
        tick:     Tick,
        source:   EntityId,
        target:   EntityId,
        strength: Coefficient,
    },
    Repression {
        tick:     Tick,
        state:    EntityId,
        target:   EntityId,
        severity: Intensity,
    },
}

impl Event {
    pub fn tick(&self) -> Tick {
        match self {
            Self::Extraction { tick, .. }
            | Self::WagePaid { tick, .. }
            | Self::RentCollected { tick, .. }
            | Self::Eviction { tick, .. }
            | Self::Spark { tick, .. }
            | Self::ConsciousnessRaised { tick, .. }
            | Self::Uprising { tick, .. }
            | Self::SolidarityFormed { tick, .. }
            | Self::Repression { tick, .. } => *tick,
        }
    }

    /// Stable name, used for the `event_type` column in the event log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. }          => "extraction",
            Self::WagePaid { .. }            => "wage_paid",
            Self::RentCollected { .. }       => "rent_collected",
            Self::Eviction { .. }            => "eviction",
            Self::Spark { .. }               => "spark",
            Self::ConsciousnessRaised { .. } => "consciousness_raised",
            Self::Uprising { .. }            => "uprising",
            Self::SolidarityFormed { .. }    => "solidarity_formed",
            Self::Repression { .. }          => "repression",
        }
    }

    /// Entities the event refers to.
    pub fn subjects(&self) -> Vec<&str> {
        match self {
            Self::Extraction { source, target, .. }
            | Self::SolidarityFormed { source, target, .. } => vec![source.as_str(), target.as_str()],
            Self::WagePaid { employer, worker, .. } => vec![employer.as_str(), worker.as_str()],
            Self::RentCollected { tenant, landlord, .. } | Self::Eviction { tenant, landlord, .. } => {
                vec![tenant.as_str(), landlord.as_str()]
            }
            Self::Spark { entity, .. }
            | Self::ConsciousnessRaised { entity, .. }
            | Self::Uprising { entity, .. } => vec![entity.as_str()],
            Self::Repression { state, target, .. } => vec![state.as_str(), target.as_str()],
        }
    }
}

impl Quantize for Event {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        let mut event = self.clone();
        match &mut event {
            Self::Extraction { amount, .. }
            | Self::WagePaid { amount, .. }
            | Self::RentCollected { amount, .. } => *amount = amount.quantize_with(q),
            Self::Eviction { .. } => {}
            Self::Spark { intensity, .. } => *intensity = intensity.quantize_with(q),
            Self::ConsciousnessRaised { level, .. } => *level = level.quantize_with(q),
            Self::Uprising { mobilization, .. } => *mobilization = mobilization.quantize_with(q),
            Self::SolidarityFormed { strength, .. } => *strength = strength.quantize_with(q),
            Self::Repression { severity, .. } => *severity = severity.quantize_with(q),
        }
        event
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub tick:       Tick,
    pub seq:        u32,
    pub event_type: String,
    pub payload:    String, // JSON-serialized Event
}
