//! System trait: the pluggable state-transition rules.
//!
//! RULE: Every system implements `System`.
//! The engine calls run() on each registered system in registration
//! order, every tick, always against the same prior state.
//! A system never sees another system's output from the same tick.
//! All randomness flows through the SystemRng it is handed.

use crate::{
    error::SimResult,
    event::Event,
    graph::StateDelta,
    rng::SystemRng,
    world::WorldState,
};
use serde::{Deserialize, Serialize};

/// Everything a tick depends on besides the prior state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInputs {
    pub seed:     u64,
    /// Externally scripted events. They join the event list after every
    /// system's events and pass through the interceptor chain like them.
    #[serde(default)]
    pub injected: Vec<Event>,
}

impl TickInputs {
    pub fn seeded(seed: u64) -> Self {
        Self { seed, injected: Vec::new() }
    }

    pub fn with_injected(mut self, events: Vec<Event>) -> Self {
        self.injected = events;
        self
    }
}

/// What one system proposes for the next tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemOutput {
    pub delta:  StateDelta,
    pub events: Vec<Event>,
}

impl SystemOutput {
    pub fn events(events: Vec<Event>) -> Self {
        Self { delta: StateDelta::default(), events }
    }
}

/// The contract every system must fulfil.
pub trait System: Send + Sync {
    /// Unique stable name. Also selects the system's RNG stream, so it
    /// must never change once assigned.
    fn name(&self) -> &'static str;

    /// Compute a proposal from `world`.
    ///
    /// - `world`:  the committed state of the previous tick
    /// - `inputs`: the tick inputs (seed, injected events)
    /// - `rng`:    this system's deterministic RNG for this tick
    ///
    /// Events should carry `world.tick() + 1`.
    fn run(
        &self,
        world: &WorldState,
        inputs: &TickInputs,
        rng: &mut SystemRng,
    ) -> SimResult<SystemOutput>;
}
