//! Graph edges: directed, typed relationships between entities.

use crate::{
    entity::EntityRole,
    quantize::{Quantize, Quantizer},
    types::EntityId,
    value::{Coefficient, Currency},
};
use serde::{Deserialize, Serialize};

/// Variants are appended, never reordered: the derived ordering sorts
/// the by-type index and therefore the canonical serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Surplus flows from the exploited source to the exploiting target.
    Exploitation,
    /// Wages flow from employer to worker.
    Wages,
    /// Rent flows from tenant to landlord.
    Tenancy,
    Adjacency,
    Solidarity,
    Administers,
    Repression,
}

impl EdgeType {
    pub const ALL: [EdgeType; 7] = [
        Self::Exploitation,
        Self::Wages,
        Self::Tenancy,
        Self::Adjacency,
        Self::Solidarity,
        Self::Administers,
        Self::Repression,
    ];

    /// Which entity roles may sit at each end of this edge type.
    pub fn permits(self, source: EntityRole, target: EntityRole) -> bool {
        use EntityRole::*;
        match self {
            Self::Exploitation => source == Worker && matches!(target, Owner | Landlord),
            Self::Wages        => source == Owner && target == Worker,
            Self::Tenancy      => matches!(source, Worker | Organization) && target == Landlord,
            Self::Adjacency    => source == Territory && target == Territory,
            Self::Solidarity   => {
                matches!(source, Worker | Organization) && matches!(target, Worker | Organization)
            }
            Self::Administers  => source == State && target == Territory,
            Self::Repression   => source == State && matches!(target, Worker | Organization),
        }
    }

    /// Edge types whose systems move wealth between the endpoints. Both
    /// ends must carry a material bundle.
    pub fn carries_wealth(self) -> bool {
        matches!(self, Self::Exploitation | Self::Wages | Self::Tenancy)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exploitation => "exploitation",
            Self::Wages        => "wages",
            Self::Tenancy      => "tenancy",
            Self::Adjacency    => "adjacency",
            Self::Solidarity   => "solidarity",
            Self::Administers  => "administers",
            Self::Repression   => "repression",
        }
    }
}

/// Identity of an edge. A graph holds at most one edge per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source:    EntityId,
    pub target:    EntityId,
    pub edge_type: EdgeType,
}

impl EdgeKey {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source:          EntityId,
    pub target:          EntityId,
    pub edge_type:       EdgeType,
    /// Value moved along the edge each tick.
    #[serde(default)]
    pub value_flow:      Currency,
    #[serde(default)]
    pub strength:        Coefficient,
    /// Total value moved along the edge since genesis.
    #[serde(default)]
    pub cumulative_flow: Currency,
}

impl Relationship {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            value_flow:      Currency::ZERO,
            strength:        Coefficient::ZERO,
            cumulative_flow: Currency::ZERO,
        }
    }

    pub fn with_flow(mut self, value_flow: Currency) -> Self {
        self.value_flow = value_flow;
        self
    }

    pub fn with_strength(mut self, strength: Coefficient) -> Self {
        self.strength = strength;
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone(), self.edge_type)
    }
}

impl Quantize for Relationship {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        Self {
            source:          self.source.clone(),
            target:          self.target.clone(),
            edge_type:       self.edge_type,
            value_flow:      self.value_flow.quantize_with(q),
            strength:        self.strength.quantize_with(q),
            cumulative_flow: self.cumulative_flow.quantize_with(q),
        }
    }
}
