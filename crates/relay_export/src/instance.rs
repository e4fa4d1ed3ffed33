//! Instance resolution.
//!
//! Turns one placement into a group node: parented, attributed, bound to a
//! material and positioned. Each (entity, instancer path) gets at most one
//! group per pass; resolving it again is a no-op.
//!
//! Placements are resolved only after their entity has been translated.
//! Until then they are skipped, which is what makes export two-phase.

use relay_core::{
    EntityId, GraphResult, Hidden, MaterialId, NodeId, Placement, SceneGraph, SourceEntity,
    SourceScene,
};

use crate::category::Category;
use crate::records::{GroupRecord, PlacementKey};
use crate::state::PassState;
use crate::translator::TranslatorRegistry;

/// Why a placement produced no group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The source scene has no entity for the placement
    UnknownEntity,
    /// No renderer category for the entity's kind
    Unsupported,
    /// Camera, armature or light filter
    Auxiliary,
    /// Implicit surface whose family is placed by another member
    FamilyMember,
    /// Not rendered in this pass
    Hidden,
    /// The entity has not been translated (yet)
    NotTranslated,
    /// No translator registered for the category
    NoTranslator,
}

/// Outcome of resolving one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created,
    AlreadyPresent,
    Skipped(SkipReason),
}

/// Resolves placements against the pass tables.
pub struct InstanceResolver<'a> {
    registry: &'a TranslatorRegistry,
    interactive: bool,
}

impl<'a> InstanceResolver<'a> {
    pub fn new(registry: &'a TranslatorRegistry, interactive: bool) -> Self {
        Self { registry, interactive }
    }

    /// Resolve one placement into a group record.
    pub fn resolve<S: SourceScene + ?Sized>(
        &self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        state: &mut PassState,
        placement: &Placement,
    ) -> GraphResult<Resolution> {
        let Some(entity) = scene.entity(placement.entity) else {
            log::debug!("Placement of unknown entity {}", placement.entity);
            return Ok(Resolution::Skipped(SkipReason::UnknownEntity));
        };

        let category = match Category::detect(entity) {
            Ok(category) => category,
            Err(err) => {
                log::debug!("Skipping placement: {}", err);
                return Ok(Resolution::Skipped(SkipReason::Unsupported));
            }
        };
        if category.is_auxiliary() {
            return Ok(Resolution::Skipped(SkipReason::Auxiliary));
        }
        if category == Category::Meta && entity.name != entity.family_name() {
            return Ok(Resolution::Skipped(SkipReason::FamilyMember));
        }
        if category == Category::Empty {
            return self.resolve_empty(graph, state, entity, placement);
        }
        if !placement.show_self {
            return Ok(Resolution::Skipped(SkipReason::Hidden));
        }

        let key = PlacementKey::for_placement(placement);
        let Some(record) = state.entities.get(&entity.id) else {
            log::debug!("Placement of '{}' before its data block", entity.name);
            return Ok(Resolution::Skipped(SkipReason::NotTranslated));
        };
        if record.instances.contains_key(&key) {
            return Ok(Resolution::AlreadyPresent);
        }
        let Some(translator) = self.registry.translator_for(category) else {
            log::debug!("No translator for {:?} '{}'", category, entity.name);
            return Ok(Resolution::Skipped(SkipReason::NoTranslator));
        };

        let parent = self.resolve_parent(graph, state, entity, placement)?;

        if state.processed.insert(entity.id) {
            if let Some(record) = state.entities.get_mut(&entity.id) {
                translator.update(graph, entity, record)?;
                translator.export_primvars(graph, entity, record)?;
            }
        }

        let Some(record) = state.entities.get(&entity.id) else {
            return Ok(Resolution::Skipped(SkipReason::NotTranslated));
        };
        let groups = self.registry.group();
        let group = groups.export(graph, &format!("{}|{}", record.db_name, key))?;
        let root = graph.root();
        graph.add_child(parent.unwrap_or(root), group)?;
        if parent.is_some() {
            graph.set_inherit_transform(group, false)?;
        }
        graph.add_child(group, record.node)?;
        if let Some(particles) = record.particle_group {
            if placement.show_particles {
                graph.add_child(group, particles)?;
            }
        }

        translator.export_object_attributes(graph, entity, group)?;
        translator.export_object_id(graph, entity, group, placement)?;
        if self.interactive && !placement.visible_in_viewport {
            graph.set_hidden(group, Hidden::Hide)?;
        }

        let material = material_for(scene, entity, placement);
        let mut is_meshlight = false;
        if let Some(bound) = material.and_then(|id| state.materials.get(&id)) {
            if let Some(node) = bound.node {
                graph.bind_material(group, node)?;
                is_meshlight = bound.is_meshlight;
            }
        }

        // Blobby families are built in world space and carry no transform
        let motion_steps = if category == Category::Meta {
            Vec::new()
        } else if record.is_transforming {
            record.motion_steps.clone()
        } else if placement.particle_system.is_some() {
            state.particle_motion_steps.clone()
        } else {
            Vec::new()
        };
        if category != Category::Meta {
            groups.place(graph, group, &motion_steps, placement.matrix_world)?;
        }

        let group_record = GroupRecord {
            node: group,
            entity: entity.id,
            material,
            motion_steps,
            is_meshlight,
        };
        if let Some(record) = state.entities.get_mut(&entity.id) {
            record.instances.insert(key, group_record);
        }
        state.num_object_instances += 1;
        Ok(Resolution::Created)
    }

    /// Empties reuse their own group node, and are placed even when hidden
    /// so children still have somewhere to attach.
    fn resolve_empty(
        &self,
        graph: &mut dyn SceneGraph,
        state: &mut PassState,
        entity: &SourceEntity,
        placement: &Placement,
    ) -> GraphResult<Resolution> {
        let key = PlacementKey::for_placement(placement);
        let Some(record) = state.entities.get(&entity.id) else {
            return Ok(Resolution::Skipped(SkipReason::NotTranslated));
        };
        if record.instances.contains_key(&key) {
            return Ok(Resolution::AlreadyPresent);
        }
        if placement.is_instance {
            return Ok(Resolution::Skipped(SkipReason::Auxiliary));
        }

        let node = record.node;
        let motion_steps = if record.is_transforming {
            record.motion_steps.clone()
        } else {
            Vec::new()
        };

        let parent = parent_empty(state, entity);
        let root = graph.root();
        graph.add_child(parent.unwrap_or(root), node)?;
        if parent.is_some() {
            graph.set_inherit_transform(node, false)?;
        }

        let hidden = if self.interactive {
            !entity.visibility.viewport || !placement.visible_in_viewport
        } else {
            !entity.visibility.render
        };
        if hidden {
            graph.set_hidden(node, Hidden::Hide)?;
        }
        if entity.export_as_coordsys {
            graph.add_coordinate_system(node)?;
        }
        self.registry.group().place(graph, node, &motion_steps, placement.matrix_world)?;

        if let Some(record) = state.entities.get_mut(&entity.id) {
            record.instances.insert(
                key,
                GroupRecord {
                    node,
                    entity: entity.id,
                    material: None,
                    motion_steps,
                    is_meshlight: false,
                },
            );
        }
        Ok(Resolution::Created)
    }

    /// Node a new group hangs under; `None` means the root.
    fn resolve_parent(
        &self,
        graph: &mut dyn SceneGraph,
        state: &mut PassState,
        entity: &SourceEntity,
        placement: &Placement,
    ) -> GraphResult<Option<NodeId>> {
        if !placement.is_instance {
            return Ok(parent_empty(state, entity));
        }

        let Some(instancer_id) = placement.parent else {
            return Ok(None);
        };
        let Some(instancer) = state.entities.get_mut(&instancer_id) else {
            return Ok(None);
        };
        instancer.objects_instanced.insert(entity.id);
        if instancer.category == Category::Empty {
            return Ok(Some(instancer.node));
        }
        if let Some(node) = instancer.instancer_group {
            return Ok(Some(node));
        }

        let node = self
            .registry
            .group()
            .export(graph, &format!("{}|instances", instancer.db_name))?;
        let root = graph.root();
        graph.add_child(root, node)?;
        instancer.instancer_group = Some(node);
        Ok(Some(node))
    }
}

/// Group node of the empty `entity` is parented to, if any.
fn parent_empty(state: &PassState, entity: &SourceEntity) -> Option<NodeId> {
    entity
        .parent
        .and_then(|id| state.entities.get(&id))
        .filter(|r| r.category == Category::Empty)
        .map(|r| r.node)
}

/// Material for a placement: the particle system's override slot when it
/// asks for one, else the entity's active material.
fn material_for<S: SourceScene + ?Sized>(
    scene: &S,
    entity: &SourceEntity,
    placement: &Placement,
) -> Option<MaterialId> {
    override_material(scene, placement.parent, placement.particle_system).or(entity.material)
}

fn override_material<S: SourceScene + ?Sized>(
    scene: &S,
    owner: Option<EntityId>,
    psys: Option<EntityId>,
) -> Option<MaterialId> {
    let owner = scene.entity(owner?)?;
    let psys_id = psys?;
    let settings = &owner
        .particle_systems
        .iter()
        .find(|p| p.id == psys_id)?
        .settings;
    if !settings.override_instance_material {
        return None;
    }
    let slot = settings.material_index.checked_sub(1)?;
    owner.material_slots.get(slot).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::EntityRecord;
    use relay_core::scene::{MaterialDesc, ObjectDesc, ParticleDesc};
    use relay_core::{MemoryGraph, NodeKind, ObjectKind, Scene, SceneDescription};
    use relay_math::Vec3;

    /// Translate every entity the way the data-block phase does, without
    /// motion.
    fn translate_all(scene: &Scene, graph: &mut MemoryGraph, registry: &TranslatorRegistry) -> PassState {
        let mut state = PassState::new();
        for material in scene.materials() {
            let record = registry.material().export(graph, material).unwrap();
            state.materials.insert(material.id, record);
        }
        for entity in scene.entities() {
            let Ok(category) = Category::detect(entity) else { continue };
            let Some(translator) = registry.translator_for(category) else { continue };
            if let Some(record) = translator.export(graph, entity, &entity.name).unwrap() {
                state.entities.insert(entity.id, record);
            }
        }
        state
    }

    fn resolve_all(scene: &Scene, graph: &mut MemoryGraph, state: &mut PassState, registry: &TranslatorRegistry) {
        let resolver = InstanceResolver::new(registry, false);
        for placement in scene.placements() {
            resolver.resolve(scene, graph, state, placement).unwrap();
        }
    }

    #[test]
    fn test_second_resolution_is_noop() {
        let desc = SceneDescription::new("t").with_object(ObjectDesc::new("Cube", ObjectKind::Mesh));
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);

        let resolver = InstanceResolver::new(&registry, false);
        let placement = &scene.placements()[0];
        assert_eq!(resolver.resolve(&scene, &mut graph, &mut state, placement).unwrap(), Resolution::Created);
        let nodes = graph.node_count();
        assert_eq!(
            resolver.resolve(&scene, &mut graph, &mut state, placement).unwrap(),
            Resolution::AlreadyPresent
        );
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(state.group_count(), 1);
    }

    #[test]
    fn test_untranslated_entity_is_skipped() {
        let desc = SceneDescription::new("t").with_object(ObjectDesc::new("Cube", ObjectKind::Mesh));
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = PassState::new();

        let resolver = InstanceResolver::new(&registry, false);
        let resolution = resolver.resolve(&scene, &mut graph, &mut state, &scene.placements()[0]).unwrap();
        assert_eq!(resolution, Resolution::Skipped(SkipReason::NotTranslated));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_instances_share_geometry() {
        let desc = SceneDescription::new("t")
            .with_object(ObjectDesc::new("Proto", ObjectKind::Mesh).points(vec![Vec3::ZERO]))
            .with_object(ObjectDesc::new("Grid", ObjectKind::Mesh).instancer(
                relay_core::scene::InstancerDesc {
                    prototypes: vec!["Proto".into()],
                    positions: vec![Vec3::ZERO, Vec3::X],
                    ..Default::default()
                },
            ));
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);
        resolve_all(&scene, &mut graph, &mut state, &registry);

        let proto = &state.entities[&EntityId::object("Proto")];
        // Direct placement plus two instances, one shared geometry node
        assert_eq!(proto.instances.len(), 3);
        assert_eq!(graph.parents_of(proto.node).len(), 3);
        assert_eq!(state.processed.len(), 1);

        let grid = &state.entities[&EntityId::object("Grid")];
        let wrapper = grid.instancer_group.unwrap();
        assert_eq!(graph.node(wrapper).unwrap().children.len(), 2);
        assert!(grid.objects_instanced.contains(&EntityId::object("Proto")));
        for child in &graph.node(wrapper).unwrap().children {
            assert!(!graph.node(*child).unwrap().inherit_transform);
        }
    }

    #[test]
    fn test_child_of_hidden_empty_attaches() {
        let mut rig = ObjectDesc::new("Rig", ObjectKind::Empty).translated(Vec3::Y);
        rig.visibility.render = false;
        let desc = SceneDescription::new("t")
            .with_object(ObjectDesc::new("Arm", ObjectKind::Mesh).parent("Rig"))
            .with_object(rig);
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);
        resolve_all(&scene, &mut graph, &mut state, &registry);

        let rig = &state.entities[&EntityId::object("Rig")];
        let rig_node = graph.node(rig.node).unwrap();
        assert_eq!(rig_node.hidden, Hidden::Hide);
        assert_eq!(rig_node.children.len(), 1);
        assert_eq!(graph.parents_of(rig.node), vec![graph.root()]);

        let arm_group = rig_node.children[0];
        assert!(!graph.node(arm_group).unwrap().inherit_transform);
    }

    #[test]
    fn test_family_members_share_one_placement() {
        let desc = SceneDescription::new("t")
            .with_object(ObjectDesc::new("B", ObjectKind::Meta).family("B"))
            .with_object(ObjectDesc::new("B.001", ObjectKind::Meta).family("B"))
            .with_object(ObjectDesc::new("A", ObjectKind::Meta));
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);

        let resolver = InstanceResolver::new(&registry, false);
        let results: Vec<_> = scene
            .placements()
            .iter()
            .map(|p| resolver.resolve(&scene, &mut graph, &mut state, p).unwrap())
            .collect();
        assert_eq!(
            results,
            vec![
                Resolution::Created,
                Resolution::Skipped(SkipReason::FamilyMember),
                Resolution::Created
            ]
        );
    }

    #[test]
    fn test_particle_material_override() {
        let desc = SceneDescription::new("t")
            .with_material(MaterialDesc::new("Rock", Some("PxrSurface")))
            .with_material(MaterialDesc::new("Moss", Some("PxrSurface")))
            .with_object(ObjectDesc::new("Pebble", ObjectKind::Mesh).material("Rock"))
            .with_object(
                ObjectDesc::new("Ground", ObjectKind::Mesh)
                    .material("Rock")
                    .material("Moss")
                    .particles(ParticleDesc {
                        override_instance_material: true,
                        material_index: 2,
                        ..ParticleDesc::new("Scatter", 2).instancing("Pebble")
                    }),
            );
        let scene = Scene::from_description(desc).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);
        resolve_all(&scene, &mut graph, &mut state, &registry);

        let moss = MaterialId::from_name("Moss");
        let pebble = &state.entities[&EntityId::object("Pebble")];
        let overridden = pebble.instances.values().filter(|g| g.material == Some(moss)).count();
        assert_eq!(overridden, 2);

        let moss_node = state.materials[&moss].node;
        let bound = pebble
            .instances
            .values()
            .filter(|g| graph.node(g.node).unwrap().material == moss_node)
            .count();
        assert_eq!(bound, 2);
    }

    #[test]
    fn test_local_view_hides_group_interactively() {
        let mut cube = ObjectDesc::new("Cube", ObjectKind::Mesh);
        cube.visibility.viewport = false;
        let scene = Scene::from_description(SceneDescription::new("t").with_object(cube)).unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = translate_all(&scene, &mut graph, &registry);

        let resolver = InstanceResolver::new(&registry, true);
        resolver.resolve(&scene, &mut graph, &mut state, &scene.placements()[0]).unwrap();
        let group = state.entities[&EntityId::object("Cube")].instances.values().next().unwrap().node;
        assert_eq!(graph.node(group).unwrap().hidden, Hidden::Hide);
    }

    #[test]
    fn test_moving_record_reserves_samples() {
        let scene = Scene::from_description(
            SceneDescription::new("t").with_object(ObjectDesc::new("Cube", ObjectKind::Mesh)),
        )
        .unwrap();
        let registry = TranslatorRegistry::with_defaults();
        let mut graph = MemoryGraph::new();
        let mut state = PassState::new();
        let node = graph.create_node(NodeKind::Mesh, "Cube").unwrap();
        let mut record = EntityRecord::new(EntityId::object("Cube"), "Cube", Category::Mesh, node);
        record.is_transforming = true;
        record.motion_steps = vec![-0.25, 0.0, 0.25];
        state.entities.insert(record.id, record);

        let resolver = InstanceResolver::new(&registry, false);
        resolver.resolve(&scene, &mut graph, &mut state, &scene.placements()[0]).unwrap();

        let group = state.entities[&EntityId::object("Cube")].instances.values().next().unwrap();
        assert_eq!(graph.num_transform_samples(group.node), 3);
        assert_eq!(graph.node(group.node).unwrap().transform.writes, vec![1, 0, 0]);
    }
}
