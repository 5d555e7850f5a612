//! Built-in systems.
//!
//! Each one reads only the committed state it is handed and proposes
//! events. None of them touch state directly: value transfers and
//! ideological shifts happen when the fold step interprets the events,
//! which keeps every effect visible to the interceptor chain.

use crate::{
    entity::ComponentKind,
    error::SimResult,
    event::Event,
    relationship::{EdgeKey, EdgeType},
    rng::SystemRng,
    system::{System, SystemOutput, TickInputs},
    value::{Coefficient, Intensity, Probability},
    world::WorldState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Consciousness gained per tick at full exploitation pressure.
pub const CONSCIOUSNESS_DRIFT: f64 = 0.02;
/// Agitation added by one spark.
pub const SPARK_INTENSITY: f64 = 0.15;
/// Agitation at which an entity rises up.
pub const UPRISING_THRESHOLD: f64 = 0.8;
/// Agitation at which a state's repression edges activate.
pub const REPRESSION_THRESHOLD: f64 = 0.5;
/// Consciousness both parties need before solidarity forms.
pub const SOLIDARITY_THRESHOLD: f64 = 0.5;

/// Configurable names for the built-in systems.
/// Listed in the config in the order they should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Extraction,
    Wages,
    Tenancy,
    Consciousness,
    Solidarity,
    Uprising,
    Repression,
}

impl SystemKind {
    pub fn build(self) -> Box<dyn System> {
        match self {
            Self::Extraction    => Box::new(ExtractionSystem),
            Self::Wages         => Box::new(WageSystem),
            Self::Tenancy       => Box::new(TenancySystem),
            Self::Consciousness => Box::new(ConsciousnessSystem),
            Self::Solidarity    => Box::new(SolidaritySystem),
            Self::Uprising      => Box::new(UprisingSystem),
            Self::Repression    => Box::new(RepressionSystem),
        }
    }
}

/// Moves each exploitation edge's flow from the exploited entity to its
/// exploiter, capped at what the source holds.
pub struct ExtractionSystem;

impl System for ExtractionSystem {
    fn name(&self) -> &'static str { "extraction" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let graph = world.graph();
        let events = graph
            .edges_of_type(EdgeType::Exploitation)
            .filter_map(|edge| {
                let held = graph.entity(&edge.source)?.wealth();
                let amount = edge.value_flow.min(held);
                (!amount.is_zero()).then(|| Event::Extraction {
                    tick,
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    amount,
                })
            })
            .collect();
        Ok(SystemOutput::events(events))
    }
}

/// Pays each wage edge's flow from employer to worker.
pub struct WageSystem;

impl System for WageSystem {
    fn name(&self) -> &'static str { "wages" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let graph = world.graph();
        let events = graph
            .edges_of_type(EdgeType::Wages)
            .filter_map(|edge| {
                let held = graph.entity(&edge.source)?.wealth();
                let amount = edge.value_flow.min(held);
                (!amount.is_zero()).then(|| Event::WagePaid {
                    tick,
                    employer: edge.source.clone(),
                    worker:   edge.target.clone(),
                    amount,
                })
            })
            .collect();
        Ok(SystemOutput::events(events))
    }
}

/// Collects rent, or evicts tenants who cannot pay it.
pub struct TenancySystem;

impl System for TenancySystem {
    fn name(&self) -> &'static str { "tenancy" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let graph = world.graph();
        let mut events = Vec::new();
        for edge in graph.edges_of_type(EdgeType::Tenancy) {
            let Some(tenant) = graph.entity(&edge.source) else { continue };
            if tenant.wealth() >= edge.value_flow {
                if !edge.value_flow.is_zero() {
                    events.push(Event::RentCollected {
                        tick,
                        tenant:   edge.source.clone(),
                        landlord: edge.target.clone(),
                        amount:   edge.value_flow,
                    });
                }
            } else {
                events.push(Event::Eviction {
                    tick,
                    tenant:   edge.source.clone(),
                    landlord: edge.target.clone(),
                });
            }
        }
        Ok(SystemOutput::events(events))
    }
}

/// Raises consciousness in proportion to exploitation pressure and
/// draws seeded sparks of agitation.
pub struct ConsciousnessSystem;

impl ConsciousnessSystem {
    /// Share of an entity's stock extracted per tick, in [0, 1].
    fn pressure(world: &WorldState, id: &str, wealth: f64) -> f64 {
        let extracted: f64 = world
            .graph()
            .outgoing(id)
            .filter(|r| r.edge_type == EdgeType::Exploitation)
            .map(|r| r.value_flow.get())
            .sum();
        if extracted + wealth <= 0.0 {
            0.0
        } else {
            extracted / (extracted + wealth)
        }
    }
}

impl System for ConsciousnessSystem {
    fn name(&self) -> &'static str { "consciousness" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let mut events = Vec::new();
        for entity in world.graph().entities_with(ComponentKind::Ideological) {
            let Some(ideology) = entity.components.ideological else { continue };
            let pressure = Self::pressure(world, &entity.id, entity.wealth().get());
            if pressure <= 0.0 {
                continue;
            }

            let level = Probability::clamped(ideology.consciousness.get() + CONSCIOUSNESS_DRIFT * pressure);
            if level != ideology.consciousness {
                events.push(Event::ConsciousnessRaised {
                    tick,
                    entity: entity.id.clone(),
                    level,
                });
            }

            let spark_odds = level.and(Probability::clamped(pressure));
            if rng.chance(spark_odds) {
                events.push(Event::Spark {
                    tick,
                    entity:    entity.id.clone(),
                    intensity: Intensity::clamped(SPARK_INTENSITY),
                });
            }
        }
        Ok(SystemOutput::events(events))
    }
}

/// Links conscious workers who share an exploiter.
pub struct SolidaritySystem;

impl System for SolidaritySystem {
    fn name(&self) -> &'static str { "solidarity" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let graph = world.graph();
        let conscious = |id: &str| {
            graph
                .entity(id)
                .and_then(|e| e.components.ideological)
                .map(|i| i.consciousness)
                .filter(|c| c.get() >= SOLIDARITY_THRESHOLD)
        };

        let mut formed = BTreeSet::new();
        let mut events = Vec::new();
        for exploiter in graph.entities() {
            let exploited: BTreeSet<&str> = graph
                .incoming(&exploiter.id)
                .filter(|r| r.edge_type == EdgeType::Exploitation)
                .map(|r| r.source.as_str())
                .collect();
            let exploited: Vec<&str> = exploited.into_iter().collect();

            for (i, a) in exploited.iter().enumerate() {
                for b in &exploited[i + 1..] {
                    let (Some(ca), Some(cb)) = (conscious(*a), conscious(*b)) else { continue };
                    let key = EdgeKey::new(*a, *b, EdgeType::Solidarity);
                    let reverse = EdgeKey::new(*b, *a, EdgeType::Solidarity);
                    if graph.relationship(&key).is_some()
                        || graph.relationship(&reverse).is_some()
                        || !formed.insert(key)
                    {
                        continue;
                    }
                    events.push(Event::SolidarityFormed {
                        tick,
                        source:   a.to_string(),
                        target:   b.to_string(),
                        strength: Coefficient::clamped((ca.get() + cb.get()) / 2.0),
                    });
                }
            }
        }
        Ok(SystemOutput::events(events))
    }
}

/// Agitated entities rise up, mobilising in proportion to their
/// consciousness and organisation.
pub struct UprisingSystem;

impl System for UprisingSystem {
    fn name(&self) -> &'static str { "uprising" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let events = world
            .graph()
            .entities_with(ComponentKind::Ideological)
            .filter_map(|entity| {
                let ideology = entity.components.ideological?;
                if ideology.agitation.get() < UPRISING_THRESHOLD {
                    return None;
                }
                let cohesion = entity
                    .components
                    .organizational
                    .map(|o| o.cohesion.get())
                    .unwrap_or(0.5);
                Some(Event::Uprising {
                    tick,
                    entity:       entity.id.clone(),
                    mobilization: ideology.consciousness.and(Probability::clamped(cohesion)),
                })
            })
            .collect();
        Ok(SystemOutput::events(events))
    }
}

/// States repress agitated entities they hold repression edges over.
pub struct RepressionSystem;

impl System for RepressionSystem {
    fn name(&self) -> &'static str { "repression" }

    fn run(&self, world: &WorldState, _inputs: &TickInputs, _rng: &mut SystemRng) -> SimResult<SystemOutput> {
        let tick = world.tick() + 1;
        let graph = world.graph();
        let events = graph
            .edges_of_type(EdgeType::Repression)
            .filter_map(|edge| {
                let agitation = graph.entity(&edge.target)?.components.ideological?.agitation;
                (agitation.get() >= REPRESSION_THRESHOLD).then(|| Event::Repression {
                    tick,
                    state:    edge.source.clone(),
                    target:   edge.target.clone(),
                    severity: Intensity::clamped(edge.strength.get()),
                })
            })
            .collect();
        Ok(SystemOutput::events(events))
    }
}
