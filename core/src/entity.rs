//! Graph nodes: entities and their component bundles.
//!
//! An entity is immutable once it sits in a `WorldGraph`. The fold step
//! works on a cloned copy and the finished graph replaces the old one.

use crate::{
    error::GraphConsistencyError,
    quantize::{Quantize, Quantizer},
    types::EntityId,
    value::{Coefficient, Currency, Ideology, Intensity, Probability},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    Worker,
    Owner,
    Landlord,
    State,
    Territory,
    Organization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Material,
    Vitality,
    Spatial,
    Ideological,
    Organizational,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Material       => "material",
            Self::Vitality       => "vitality",
            Self::Spatial        => "spatial",
            Self::Ideological    => "ideological",
            Self::Organizational => "organizational",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Material {
    pub wealth:      Currency,
    /// Per-tick consumption needed to reproduce the entity.
    pub subsistence: Currency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vitality {
    pub health:    Probability,
    pub mortality: Probability,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spatial {
    /// Surveillance pressure on the entity's location.
    pub heat:     Intensity,
    pub mobility: Coefficient,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ideological {
    pub alignment:     Ideology,
    pub consciousness: Probability,
    pub agitation:     Intensity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organizational {
    pub cohesion: Coefficient,
    pub cadre:    Probability,
}

/// The set of bundles an entity carries. At most one of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material:       Option<Material>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitality:       Option<Vitality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial:        Option<Spatial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideological:    Option<Ideological>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational: Option<Organizational>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub id:         EntityId,
    pub role:       EntityRole,
    #[serde(default)]
    pub components: Components,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, role: EntityRole) -> Self {
        Self {
            id: id.into(),
            role,
            components: Components::default(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.components.material = Some(material);
        self
    }

    pub fn with_vitality(mut self, vitality: Vitality) -> Self {
        self.components.vitality = Some(vitality);
        self
    }

    pub fn with_spatial(mut self, spatial: Spatial) -> Self {
        self.components.spatial = Some(spatial);
        self
    }

    pub fn with_ideological(mut self, ideological: Ideological) -> Self {
        self.components.ideological = Some(ideological);
        self
    }

    pub fn with_organizational(mut self, organizational: Organizational) -> Self {
        self.components.organizational = Some(organizational);
        self
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Material       => self.components.material.is_some(),
            ComponentKind::Vitality       => self.components.vitality.is_some(),
            ComponentKind::Spatial        => self.components.spatial.is_some(),
            ComponentKind::Ideological    => self.components.ideological.is_some(),
            ComponentKind::Organizational => self.components.organizational.is_some(),
        }
    }

    /// Wealth held, zero for entities without a material bundle.
    pub fn wealth(&self) -> Currency {
        self.components.material.map(|m| m.wealth).unwrap_or_default()
    }

    pub(crate) fn material_mut(&mut self) -> Result<&mut Material, GraphConsistencyError> {
        let id = &self.id;
        self.components.material.as_mut().ok_or_else(|| GraphConsistencyError::MissingComponent {
            entity:    id.clone(),
            component: ComponentKind::Material.name(),
        })
    }

    pub(crate) fn ideological_mut(&mut self) -> Result<&mut Ideological, GraphConsistencyError> {
        let id = &self.id;
        self.components.ideological.as_mut().ok_or_else(|| GraphConsistencyError::MissingComponent {
            entity:    id.clone(),
            component: ComponentKind::Ideological.name(),
        })
    }
}

impl Quantize for Entity {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        let c = &self.components;
        Self {
            id:   self.id.clone(),
            role: self.role,
            components: Components {
                material: c.material.map(|m| Material {
                    wealth:      m.wealth.quantize_with(q),
                    subsistence: m.subsistence.quantize_with(q),
                }),
                vitality: c.vitality.map(|v| Vitality {
                    health:    v.health.quantize_with(q),
                    mortality: v.mortality.quantize_with(q),
                }),
                spatial: c.spatial.map(|s| Spatial {
                    heat:     s.heat.quantize_with(q),
                    mobility: s.mobility.quantize_with(q),
                }),
                ideological: c.ideological.map(|i| Ideological {
                    alignment:     i.alignment.quantize_with(q),
                    consciousness: i.consciousness.quantize_with(q),
                    agitation:     i.agitation.quantize_with(q),
                }),
                organizational: c.organizational.map(|o| Organizational {
                    cohesion: o.cohesion.quantize_with(q),
                    cadre:    o.cadre.quantize_with(q),
                }),
            },
        }
    }
}
