//! Per-pass records of what has been written to the target graph.

use std::collections::{HashMap, HashSet};
use std::fmt;

use relay_core::{EntityId, MaterialId, NodeId, Placement};
use serde::Serialize;

use crate::category::Category;

/// Key of one placement within its entity's instance table.
///
/// Stable for a given (entity, instancer path) and distinct across the
/// placements of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlacementKey(String);

impl PlacementKey {
    /// Key for a non-instanced placement of `entity`.
    pub fn direct(entity: EntityId) -> Self {
        Self(entity.to_string())
    }

    /// Key for any placement.
    pub fn for_placement(placement: &Placement) -> Self {
        if !placement.is_instance {
            return Self::direct(placement.entity);
        }

        let mut key = String::new();
        if let Some(parent) = placement.parent {
            key.push_str(&parent.to_string());
            key.push('|');
        }
        if let Some(psys) = placement.particle_system {
            key.push_str(&psys.to_string());
            key.push('|');
        }
        key.push_str(&placement.entity.to_string());
        for id in &placement.persistent_id {
            key.push('|');
            key.push_str(&id.to_string());
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlacementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One placement of an entity: a group node carrying transform and material.
#[derive(Clone, Debug, Serialize)]
pub struct GroupRecord {
    pub node: NodeId,
    /// Entity this group places
    pub entity: EntityId,
    /// Material bound to the group
    pub material: Option<MaterialId>,
    /// Transform sample times; empty for a static transform
    pub motion_steps: Vec<f32>,
    pub is_meshlight: bool,
}

impl GroupRecord {
    pub fn is_moving(&self) -> bool {
        !self.motion_steps.is_empty()
    }

    /// Index of `offset` in this group's sample list.
    pub fn sample_index(&self, offset: f32) -> Option<usize> {
        self.motion_steps.iter().position(|s| *s == offset)
    }
}

/// One translated entity (object or data block), shared by all its
/// placements.
#[derive(Clone, Debug, Serialize)]
pub struct EntityRecord {
    pub id: EntityId,
    /// Name used for target nodes
    pub db_name: String,
    pub category: Category,
    /// Geometry / light / group node owned by this record
    pub node: NodeId,
    pub is_transforming: bool,
    pub is_deforming: bool,
    /// Transform sample times
    pub motion_steps: Vec<f32>,
    /// Deformation sample times
    pub deform_motion_steps: Vec<f32>,
    /// Placements created this pass
    #[serde(skip)]
    pub instances: HashMap<PlacementKey, GroupRecord>,
    /// Group holding this entity's particle systems
    pub particle_group: Option<NodeId>,
    pub particle_systems: Vec<EntityId>,
    /// Group wrapping the placements this entity instances
    pub instancer_group: Option<NodeId>,
    /// Owning entity (particle systems only)
    pub parent: Option<EntityId>,
    /// Entities placed through this instancer
    #[serde(skip)]
    pub objects_instanced: HashSet<EntityId>,
}

impl EntityRecord {
    pub fn new(id: EntityId, db_name: impl Into<String>, category: Category, node: NodeId) -> Self {
        Self {
            id,
            db_name: db_name.into(),
            category,
            node,
            is_transforming: false,
            is_deforming: false,
            motion_steps: Vec::new(),
            deform_motion_steps: Vec::new(),
            instances: HashMap::new(),
            particle_group: None,
            particle_systems: Vec::new(),
            instancer_group: None,
            parent: None,
            objects_instanced: HashSet::new(),
        }
    }

    /// Whether any sample list is active.
    pub fn is_moving(&self) -> bool {
        self.is_transforming || self.is_deforming
    }

    /// Index of `offset` in the transform sample list.
    pub fn transform_index(&self, offset: f32) -> Option<usize> {
        self.motion_steps.iter().position(|s| *s == offset)
    }

    /// Index of `offset` in the deformation sample list.
    pub fn deform_index(&self, offset: f32) -> Option<usize> {
        self.deform_motion_steps.iter().position(|s| *s == offset)
    }
}

/// One translated material.
#[derive(Clone, Debug, Serialize)]
pub struct MaterialRecord {
    pub id: MaterialId,
    pub name: String,
    /// Material node; `None` when there is nothing to render
    pub node: Option<NodeId>,
    pub is_meshlight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_math::Mat4;

    fn instance(persistent_id: Vec<u32>) -> Placement {
        Placement {
            is_instance: true,
            parent: Some(EntityId::object("Grid")),
            persistent_id,
            ..Placement::direct(EntityId::object("Proto"), Mat4::IDENTITY)
        }
    }

    #[test]
    fn test_direct_key_is_entity() {
        let cube = EntityId::object("Cube");
        let placement = Placement::direct(cube, Mat4::IDENTITY);
        assert_eq!(PlacementKey::for_placement(&placement), PlacementKey::direct(cube));
    }

    #[test]
    fn test_instance_keys_are_distinct() {
        let a = PlacementKey::for_placement(&instance(vec![0]));
        let b = PlacementKey::for_placement(&instance(vec![1]));
        assert_ne!(a, b);
        assert_eq!(a, PlacementKey::for_placement(&instance(vec![0])));
    }

    #[test]
    fn test_particle_key_includes_system() {
        let mut a = instance(vec![0, 3]);
        a.particle_system = Some(EntityId::particle_system("Emitter", "Spray"));
        let mut b = a.clone();
        b.particle_system = Some(EntityId::particle_system("Emitter", "Dust"));
        assert_ne!(PlacementKey::for_placement(&a), PlacementKey::for_placement(&b));
    }

    #[test]
    fn test_sample_index() {
        let group = GroupRecord {
            node: NodeId(1),
            entity: EntityId::object("Cube"),
            material: None,
            motion_steps: vec![-0.25, 0.25],
            is_meshlight: false,
        };
        assert_eq!(group.sample_index(0.25), Some(1));
        assert_eq!(group.sample_index(0.0), None);
    }
}
