//! The world graph: typed entities joined by typed, directed edges.
//!
//! RULE: A `WorldGraph` is never mutated once built. Changes go through
//! a `GraphBuilder` (copy-on-write over `Arc` values, so unchanged
//! entities and edges are shared with the previous graph) and come out
//! as a new, re-validated graph.
//!
//! Adjacency and by-type indices are derived data. They are rebuilt on
//! every construction and excluded from equality and serialization.

use crate::{
    entity::{ComponentKind, Entity},
    error::GraphConsistencyError,
    quantize::{quantize, Quantize, Quantizer},
    relationship::{EdgeKey, EdgeType, Relationship},
    types::EntityId,
    value::Currency,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Proposed changes from one system. Removals apply before upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default)]
    pub upsert_entities:      Vec<Entity>,
    #[serde(default)]
    pub remove_entities:      Vec<EntityId>,
    #[serde(default)]
    pub upsert_relationships: Vec<Relationship>,
    #[serde(default)]
    pub remove_relationships: Vec<EdgeKey>,
    /// Added to the economy's surplus pool.
    #[serde(default)]
    pub pool_credit:          Currency,
    /// Removed from the economy's surplus pool.
    #[serde(default)]
    pub pool_debit:           Currency,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.upsert_entities.is_empty()
            && self.remove_entities.is_empty()
            && self.upsert_relationships.is_empty()
            && self.remove_relationships.is_empty()
            && self.pool_credit.is_zero()
            && self.pool_debit.is_zero()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr", into = "GraphRepr")]
pub struct WorldGraph {
    entities: BTreeMap<EntityId, Arc<Entity>>,
    edges:    BTreeMap<EdgeKey, Arc<Relationship>>,
    outgoing: BTreeMap<EntityId, Vec<Arc<Relationship>>>,
    incoming: BTreeMap<EntityId, Vec<Arc<Relationship>>>,
    by_type:  BTreeMap<EdgeType, Vec<Arc<Relationship>>>,
}

impl WorldGraph {
    /// Build and validate a graph. Rejects duplicate entity keys,
    /// duplicate edges, self-loops, unknown endpoints and role mismatches.
    pub fn new(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
    ) -> Result<Self, GraphConsistencyError> {
        let mut entity_map = BTreeMap::new();
        for entity in entities {
            let id = entity.id.clone();
            if entity_map.insert(id.clone(), Arc::new(entity)).is_some() {
                return Err(GraphConsistencyError::DuplicateEntity(id));
            }
        }

        let mut edge_map = BTreeMap::new();
        for rel in relationships {
            let key = rel.key();
            if edge_map.contains_key(&key) {
                return Err(GraphConsistencyError::DuplicateRelationship {
                    source_id: key.source,
                    target_id: key.target,
                    edge_type: key.edge_type,
                });
            }
            edge_map.insert(key, Arc::new(rel));
        }

        validate_edges(&entity_map, &edge_map)?;
        Ok(Self::assemble(entity_map, edge_map))
    }

    /// Index an already-validated pair of maps.
    fn assemble(
        entities: BTreeMap<EntityId, Arc<Entity>>,
        edges: BTreeMap<EdgeKey, Arc<Relationship>>,
    ) -> Self {
        let mut outgoing: BTreeMap<EntityId, Vec<Arc<Relationship>>> = BTreeMap::new();
        let mut incoming: BTreeMap<EntityId, Vec<Arc<Relationship>>> = BTreeMap::new();
        let mut by_type:  BTreeMap<EdgeType, Vec<Arc<Relationship>>> = BTreeMap::new();
        for rel in edges.values() {
            outgoing.entry(rel.source.clone()).or_default().push(Arc::clone(rel));
            incoming.entry(rel.target.clone()).or_default().push(Arc::clone(rel));
            by_type.entry(rel.edge_type).or_default().push(Arc::clone(rel));
        }
        Self { entities, edges, outgoing, incoming, by_type }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// All entities in key order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values().map(Arc::as_ref)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship(&self, key: &EdgeKey) -> Option<&Relationship> {
        self.edges.get(key).map(Arc::as_ref)
    }

    /// All relationships in key order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> + '_ {
        self.edges.values().map(Arc::as_ref)
    }

    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.outgoing.get(id).into_iter().flatten().map(Arc::as_ref)
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.incoming.get(id).into_iter().flatten().map(Arc::as_ref)
    }

    /// Entities one edge away in either direction, in key order.
    pub fn neighbors(&self, id: &str) -> Vec<&Entity> {
        let ids: BTreeSet<&str> = self
            .outgoing(id)
            .map(|r| r.target.as_str())
            .chain(self.incoming(id).map(|r| r.source.as_str()))
            .collect();
        ids.into_iter().filter_map(|n| self.entity(n)).collect()
    }

    pub fn edges_of_type(&self, edge_type: EdgeType) -> impl Iterator<Item = &Relationship> + '_ {
        self.by_type.get(&edge_type).into_iter().flatten().map(Arc::as_ref)
    }

    /// The edges of one type together with every entity they touch.
    pub fn subgraph(&self, edge_type: EdgeType) -> WorldGraph {
        let mut entities = BTreeMap::new();
        let mut edges = BTreeMap::new();
        for rel in self.by_type.get(&edge_type).into_iter().flatten() {
            for end in [&rel.source, &rel.target] {
                if let Some(entity) = self.entities.get(end) {
                    entities.insert(end.clone(), Arc::clone(entity));
                }
            }
            edges.insert(rel.key(), Arc::clone(rel));
        }
        Self::assemble(entities, edges)
    }

    pub fn entities_with(&self, kind: ComponentKind) -> impl Iterator<Item = &Entity> + '_ {
        self.entities().filter(move |e| e.has(kind))
    }

    /// Sum `f` over every entity carrying `kind`, quantized.
    pub fn aggregate<F>(&self, kind: ComponentKind, f: F) -> f64
    where
        F: Fn(&Entity) -> f64,
    {
        quantize(self.entities_with(kind).map(f).sum())
    }

    pub fn total_wealth(&self) -> f64 {
        self.aggregate(ComponentKind::Material, |e| e.wealth().get())
    }

    /// A new graph with `delta` applied. The receiver is untouched.
    pub fn apply(&self, delta: &StateDelta) -> Result<WorldGraph, GraphConsistencyError> {
        let mut builder = GraphBuilder::from_graph(self);
        builder.apply_delta(delta)?;
        builder.finish()
    }
}

impl PartialEq for WorldGraph {
    fn eq(&self, other: &Self) -> bool {
        self.entities == other.entities && self.edges == other.edges
    }
}

impl Eq for WorldGraph {}

impl Hash for WorldGraph {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entities.hash(state);
        self.edges.hash(state);
    }
}

impl Quantize for WorldGraph {
    fn quantize_with(&self, q: &Quantizer) -> Self {
        let entities = self
            .entities
            .iter()
            .map(|(id, e)| (id.clone(), Arc::new(e.quantize_with(q))))
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|(key, r)| (key.clone(), Arc::new(r.quantize_with(q))))
            .collect();
        Self::assemble(entities, edges)
    }
}

fn validate_edges(
    entities: &BTreeMap<EntityId, Arc<Entity>>,
    edges: &BTreeMap<EdgeKey, Arc<Relationship>>,
) -> Result<(), GraphConsistencyError> {
    for rel in edges.values() {
        if rel.source == rel.target {
            return Err(GraphConsistencyError::SelfLoop(rel.source.clone()));
        }
        let endpoint = |id: &EntityId| {
            entities.get(id).ok_or_else(|| GraphConsistencyError::UnknownEndpoint {
                edge_type: rel.edge_type,
                missing:   id.clone(),
            })
        };
        let source = endpoint(&rel.source)?;
        let target = endpoint(&rel.target)?;
        if !rel.edge_type.permits(source.role, target.role) {
            return Err(GraphConsistencyError::RoleMismatch {
                edge_type:   rel.edge_type,
                source_role: source.role,
                target_role: target.role,
            });
        }
        if rel.edge_type.carries_wealth() {
            if let Some(bare) = [source, target].into_iter().find(|e| !e.has(ComponentKind::Material)) {
                return Err(GraphConsistencyError::MissingComponent {
                    entity:    bare.id.clone(),
                    component: ComponentKind::Material.name(),
                });
            }
        }
    }
    Ok(())
}

// ── Builder ────────────────────────────────────────────────────

/// Mutable working copy of a graph, used while folding a tick.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    entities: BTreeMap<EntityId, Arc<Entity>>,
    edges:    BTreeMap<EdgeKey, Arc<Relationship>>,
}

impl GraphBuilder {
    pub fn from_graph(graph: &WorldGraph) -> Self {
        Self {
            entities: graph.entities.clone(),
            edges:    graph.edges.clone(),
        }
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id).map(Arc::as_ref)
    }

    /// Copy-on-write access to one entity.
    pub fn entity_mut(&mut self, id: &str) -> Result<&mut Entity, GraphConsistencyError> {
        self.entities
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| GraphConsistencyError::UnknownEntity(id.to_string()))
    }

    pub fn relationship_mut(&mut self, key: &EdgeKey) -> Option<&mut Relationship> {
        self.edges.get_mut(key).map(Arc::make_mut)
    }

    pub fn upsert_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), Arc::new(entity));
    }

    pub fn remove_entity(&mut self, id: &str) -> Result<(), GraphConsistencyError> {
        self.entities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GraphConsistencyError::UnknownEntity(id.to_string()))
    }

    pub fn upsert_relationship(&mut self, rel: Relationship) {
        self.edges.insert(rel.key(), Arc::new(rel));
    }

    /// Returns whether the edge existed.
    pub fn remove_relationship(&mut self, key: &EdgeKey) -> bool {
        self.edges.remove(key).is_some()
    }

    pub fn apply_delta(&mut self, delta: &StateDelta) -> Result<(), GraphConsistencyError> {
        for id in &delta.remove_entities {
            self.remove_entity(id)?;
        }
        for key in &delta.remove_relationships {
            self.remove_relationship(key);
        }
        for entity in &delta.upsert_entities {
            self.upsert_entity(entity.clone());
        }
        for rel in &delta.upsert_relationships {
            self.upsert_relationship(rel.clone());
        }
        Ok(())
    }

    /// Validate and index. Edges left dangling by a removed entity are
    /// an error, not silently dropped.
    pub fn finish(self) -> Result<WorldGraph, GraphConsistencyError> {
        validate_edges(&self.entities, &self.edges)?;
        Ok(WorldGraph::assemble(self.entities, self.edges))
    }
}

// ── Serialization ──────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct GraphRepr {
    entities:      Vec<Entity>,
    relationships: Vec<Relationship>,
}

impl From<WorldGraph> for GraphRepr {
    fn from(graph: WorldGraph) -> Self {
        Self {
            entities:      graph.entities().cloned().collect(),
            relationships: graph.relationships().cloned().collect(),
        }
    }
}

impl TryFrom<GraphRepr> for WorldGraph {
    type Error = GraphConsistencyError;
    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        WorldGraph::new(repr.entities, repr.relationships)
    }
}
