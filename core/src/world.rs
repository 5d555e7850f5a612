//! The immutable per-tick world snapshot.

use crate::{
    entity::Entity,
    error::{GraphConsistencyError, SimResult},
    event::Event,
    graph::{StateDelta, WorldGraph},
    quantize::{Quantize, Quantizer},
    relationship::{EdgeType, Relationship},
    rng::fnv1a,
    types::Tick,
    value::{Coefficient, Currency},
};
use serde::{Deserialize, Serialize};

/// Scalar aggregates that belong to the world rather than any entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Economy {
    pub surplus_pool:          Currency,
    /// Total extracted along exploitation edges since genesis.
    pub cumulative_extraction: Currency,
    /// Share of a worker's product returned as wages.
    pub wage_rate:             Coefficient,
}

impl Quantize for Economy {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        Self {
            surplus_pool:          self.surplus_pool.quantize_with(q),
            cumulative_extraction: self.cumulative_extraction.quantize_with(q),
            wage_rate:             self.wage_rate.quantize_with(q),
        }
    }
}

/// One tick's complete state. Held behind `Arc` by the history stack;
/// systems receive it by reference and return deltas, never a mutated copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldState {
    tick:    Tick,
    graph:   WorldGraph,
    economy: Economy,
    /// Events folded into this state, in fold order.
    events:  Vec<Event>,
}

impl WorldState {
    /// The tick-0 state a run starts from.
    pub fn genesis(graph: WorldGraph, economy: Economy) -> Self {
        Self { tick: 0, graph, economy, events: Vec::new() }
    }

    pub(crate) fn from_parts(tick: Tick, graph: WorldGraph, economy: Economy, events: Vec<Event>) -> Self {
        Self { tick, graph, economy, events }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn context(&self) -> WorldContext<'_> {
        WorldContext { world: self }
    }

    /// A new snapshot at the same tick with `delta` applied.
    pub fn apply(&self, delta: &StateDelta) -> SimResult<WorldState> {
        let graph = self.graph.apply(delta)?;
        let surplus_pool = self
            .economy
            .surplus_pool
            .checked_add(delta.pool_credit)?
            .checked_sub(delta.pool_debit)?;
        Ok(Self {
            tick: self.tick,
            graph,
            economy: Economy { surplus_pool, ..self.economy },
            events: self.events.clone(),
        })
    }

    /// Re-check the invariants a deserialized state must satisfy: the
    /// graph is consistent, and every event belongs to this tick and
    /// refers to entities that exist.
    pub fn validate(&self) -> Result<(), GraphConsistencyError> {
        WorldGraph::new(
            self.graph.entities().cloned().collect(),
            self.graph.relationships().cloned().collect(),
        )?;
        for event in &self.events {
            if event.tick() != self.tick {
                return Err(GraphConsistencyError::StaleEvent {
                    kind:       event.kind(),
                    event_tick: event.tick(),
                    state_tick: self.tick,
                });
            }
            if let Some(missing) = event.subjects().into_iter().find(|id| !self.graph.contains(id)) {
                return Err(GraphConsistencyError::UnknownEntity(missing.to_string()));
            }
        }
        Ok(())
    }

    /// Stable 64-bit fingerprint of the canonical JSON form.
    pub fn digest(&self) -> SimResult<u64> {
        Ok(fnv1a(&serde_json::to_vec(self)?))
    }
}

impl Quantize for WorldState {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        Self {
            tick:    self.tick,
            graph:   self.graph.quantize_with(q),
            economy: self.economy.quantize_with(q),
            events:  self.events.iter().map(|e| e.quantize_with(q)).collect(),
        }
    }
}

/// Read-only narrow view of a `WorldState`, handed to interceptors.
#[derive(Debug, Clone, Copy)]
pub struct WorldContext<'a> {
    world: &'a WorldState,
}

impl<'a> WorldContext<'a> {
    pub fn tick(&self) -> Tick {
        self.world.tick
    }

    pub fn entity(&self, id: &str) -> Option<&'a Entity> {
        self.world.graph.entity(id)
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.world.graph.incoming(id)
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.world.graph.outgoing(id)
    }

    pub fn edges_of_type(&self, edge_type: EdgeType) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.world.graph.edges_of_type(edge_type)
    }

    pub fn economy(&self) -> &'a Economy {
        &self.world.economy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::{EntityRole, Material},
        error::{SimError, ValueError},
        scenario::Scenario,
    };

    fn town() -> WorldState {
        Scenario::company_town().genesis().unwrap()
    }

    #[test]
    fn apply_returns_a_new_state_and_leaves_the_receiver_alone() {
        let world = town();
        let before = world.clone();
        let delta = StateDelta {
            upsert_entities: vec![Entity::new("newcomer", EntityRole::Worker).with_material(Material::default())],
            pool_credit:     Currency::clamped(5.0),
            pool_debit:      Currency::clamped(2.0),
            ..StateDelta::default()
        };

        let next = world.apply(&delta).unwrap();
        assert_eq!(world, before);
        assert!(!world.graph().contains("newcomer"));
        assert!(next.graph().contains("newcomer"));
        assert_eq!(next.economy().surplus_pool.get(), 53.0);
        assert_eq!(next.tick(), world.tick());
    }

    #[test]
    fn pool_debit_past_zero_is_an_underflow() {
        let world = town();
        let delta = StateDelta { pool_debit: Currency::clamped(51.0), ..StateDelta::default() };

        let err = world.apply(&delta).unwrap_err();
        assert!(matches!(err, SimError::Value(ValueError::Underflow { .. })), "got {err:?}");
        assert_eq!(world.economy().surplus_pool.get(), 50.0);
    }
}
