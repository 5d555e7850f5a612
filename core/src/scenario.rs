//! Starting worlds.
//!
//! A scenario is a JSON document listing entities, relationships and the
//! starting economy. The runner loads one from disk; tests use the
//! builders here.

use crate::{
    entity::{Entity, EntityRole, Ideological, Material, Organizational, Spatial},
    error::SimResult,
    graph::WorldGraph,
    relationship::{EdgeType, Relationship},
    value::{Coefficient, Currency, Ideology, Intensity, Probability},
    world::{Economy, WorldState},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name:          String,
    pub entities:      Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub economy:       Economy,
}

impl Scenario {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let scenario = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(scenario)
    }

    /// Validate into a tick-0 world.
    pub fn genesis(&self) -> SimResult<WorldState> {
        let graph = WorldGraph::new(self.entities.clone(), self.relationships.clone())?;
        Ok(WorldState::genesis(graph, self.economy))
    }

    /// One worker, one owner, one exploitation edge moving 1.0 per tick.
    pub fn worker_owner() -> Self {
        let worker = Entity::new("worker", EntityRole::Worker)
            .with_material(Material {
                wealth:      currency(100.0),
                subsistence: currency(1.0),
            })
            .with_ideological(Ideological {
                alignment:     Ideology::ZERO,
                consciousness: Probability::clamped(0.1),
                agitation:     Intensity::ZERO,
            });
        let owner = Entity::new("owner", EntityRole::Owner).with_material(Material::default());

        Self {
            name:          "worker_owner".into(),
            entities:      vec![worker, owner],
            relationships: vec![
                Relationship::new("worker", "owner", EdgeType::Exploitation)
                    .with_flow(currency(1.0))
                    .with_strength(Coefficient::clamped(0.6)),
            ],
            economy: Economy {
                wage_rate: Coefficient::clamped(0.5),
                ..Economy::default()
            },
        }
    }

    /// Three workers under one owner and one landlord, watched by a state.
    /// Exercises every built-in system.
    pub fn company_town() -> Self {
        let worker = |id: &str, wealth: f64, consciousness: f64, agitation: f64| {
            Entity::new(id, EntityRole::Worker)
                .with_material(Material {
                    wealth:      currency(wealth),
                    subsistence: currency(1.0),
                })
                .with_ideological(Ideological {
                    alignment:     Ideology::ZERO,
                    consciousness: Probability::clamped(consciousness),
                    agitation:     Intensity::clamped(agitation),
                })
                .with_spatial(Spatial::default())
        };

        let entities = vec![
            worker("w-ana", 40.0, 0.55, 0.2),
            worker("w-ben", 25.0, 0.60, 0.85),
            worker("w-cho", 5.0, 0.20, 0.0),
            Entity::new("union", EntityRole::Organization)
                .with_ideological(Ideological {
                    alignment:     Ideology::clamped(-0.3),
                    consciousness: Probability::clamped(0.7),
                    agitation:     Intensity::clamped(0.4),
                })
                .with_organizational(Organizational {
                    cohesion: Coefficient::clamped(0.5),
                    cadre:    Probability::clamped(0.1),
                }),
            Entity::new("mill", EntityRole::Owner).with_material(Material {
                wealth:      currency(500.0),
                subsistence: currency(5.0),
            }),
            Entity::new("estate", EntityRole::Landlord).with_material(Material::default()),
            Entity::new("state", EntityRole::State),
        ];

        let flow = |amount: f64| currency(amount);
        let relationships = vec![
            Relationship::new("w-ana", "mill", EdgeType::Exploitation).with_flow(flow(3.0)),
            Relationship::new("w-ben", "mill", EdgeType::Exploitation).with_flow(flow(3.0)),
            Relationship::new("w-cho", "mill", EdgeType::Exploitation).with_flow(flow(2.0)),
            Relationship::new("mill", "w-ana", EdgeType::Wages).with_flow(flow(2.0)),
            Relationship::new("mill", "w-ben", EdgeType::Wages).with_flow(flow(2.0)),
            Relationship::new("mill", "w-cho", EdgeType::Wages).with_flow(flow(1.0)),
            Relationship::new("w-ana", "estate", EdgeType::Tenancy).with_flow(flow(1.0)),
            Relationship::new("w-cho", "estate", EdgeType::Tenancy).with_flow(flow(8.0)),
            Relationship::new("state", "w-ben", EdgeType::Repression)
                .with_strength(Coefficient::clamped(0.95)),
            Relationship::new("state", "union", EdgeType::Repression)
                .with_strength(Coefficient::clamped(0.3)),
        ];

        Self {
            name: "company_town".into(),
            entities,
            relationships,
            economy: Economy {
                surplus_pool: currency(50.0),
                wage_rate:    Coefficient::clamped(0.4),
                ..Economy::default()
            },
        }
    }
}

fn currency(amount: f64) -> Currency {
    Currency::clamped(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scenarios_are_consistent() {
        assert!(Scenario::worker_owner().genesis().is_ok());
        let town = Scenario::company_town().genesis().unwrap();
        assert_eq!(town.tick(), 0);
        assert_eq!(town.graph().entity_count(), 7);
    }

    #[test]
    fn round_trips_through_json() {
        let scenario = Scenario::company_town();
        let json = serde_json::to_string_pretty(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scenario);
    }
}
