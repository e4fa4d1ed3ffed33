//! Translators: per-category builders of target graph nodes.
//!
//! A [`Translator`] turns one source entity into a node and keeps that node
//! current. The exporter calls `export` once per entity per pass, `update`
//! once per entity per pass (however many times it is placed), and
//! `export_deform_sample` once per deformation sample.
//!
//! Categories map to translators through a [`TranslatorRegistry`] built
//! once at startup. Groups, cameras, particle systems and materials are not
//! placed like ordinary entities and have dedicated translators.

mod camera;
mod empty;
mod geometry;
mod group;
mod light;
mod material;
mod particles;

pub use camera::CameraTranslator;
pub use empty::EmptyTranslator;
pub use geometry::GeometryTranslator;
pub use group::GroupTranslator;
pub use light::LightTranslator;
pub use material::MaterialTranslator;
pub use particles::ParticlesTranslator;

use std::collections::HashMap;

use relay_core::{AttrValue, GraphResult, NodeId, NodeKind, Placement, SceneGraph, SourceEntity};

use crate::category::Category;
use crate::records::EntityRecord;

/// Builds and refreshes the target node of one category.
pub trait Translator {
    /// Create the node and record for `entity`.
    ///
    /// Returning `Ok(None)` means the entity has nothing to render; the
    /// caller skips it.
    fn export(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        db_name: &str,
    ) -> GraphResult<Option<EntityRecord>>;

    /// Refresh static attributes from the entity's current state.
    fn update(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &mut EntityRecord,
    ) -> GraphResult<()>;

    /// Write user primvars.
    fn export_primvars(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &EntityRecord,
    ) -> GraphResult<()> {
        for (name, values) in &entity.primvars {
            graph.set_primvar(record.node, name, AttrValue::Floats(values.clone()))?;
        }
        Ok(())
    }

    /// Write deformation sample `index`, already reserved by `update`.
    fn export_deform_sample(
        &self,
        _graph: &mut dyn SceneGraph,
        _record: &EntityRecord,
        _entity: &SourceEntity,
        _index: usize,
    ) -> GraphResult<()> {
        Ok(())
    }

    /// Ray visibility and naming on a placement group.
    fn export_object_attributes(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        group: NodeId,
    ) -> GraphResult<()> {
        let visibility = &entity.visibility;
        graph.set_attribute(group, "visibility:camera", visibility.camera.into())?;
        graph.set_attribute(group, "visibility:indirect", visibility.indirect.into())?;
        graph.set_attribute(group, "visibility:transmission", visibility.transmission.into())?;
        graph.set_attribute(group, "identifier:name", entity.name.as_str().into())
    }

    /// Object id metadata on a placement group.
    fn export_object_id(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        group: NodeId,
        placement: &Placement,
    ) -> GraphResult<()> {
        graph.set_attribute(group, "identifier:id", entity.id.short().into())?;
        if placement.is_instance {
            let path: Vec<i32> = placement.persistent_id.iter().map(|id| *id as i32).collect();
            graph.set_attribute(group, "identifier:instance", path.into())?;
        }
        Ok(())
    }
}

/// Category to translator table.
pub struct TranslatorRegistry {
    translators: HashMap<Category, Box<dyn Translator>>,
    group: GroupTranslator,
    camera: CameraTranslator,
    particles: ParticlesTranslator,
    material: MaterialTranslator,
}

impl Default for TranslatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TranslatorRegistry {
    /// Registry with no category translators.
    pub fn empty() -> Self {
        Self {
            translators: HashMap::new(),
            group: GroupTranslator,
            camera: CameraTranslator,
            particles: ParticlesTranslator,
            material: MaterialTranslator,
        }
    }

    /// Registry with the built-in translators.
    pub fn with_defaults() -> Self {
        let geometry = [
            (Category::Mesh, NodeKind::Mesh),
            (Category::Curve, NodeKind::Curves),
            (Category::Points, NodeKind::Points),
            (Category::Volume, NodeKind::Volume),
            (Category::Meta, NodeKind::Blobby),
        ];

        let mut registry = Self::empty();
        for (category, kind) in geometry {
            registry.register(category, Box::new(GeometryTranslator::new(category, kind)));
        }
        registry.register(Category::Light, Box::new(LightTranslator));
        registry.register(Category::Empty, Box::new(EmptyTranslator));
        registry
    }

    /// Install or replace the translator for `category`.
    pub fn register(&mut self, category: Category, translator: Box<dyn Translator>) {
        self.translators.insert(category, translator);
    }

    pub fn translator_for(&self, category: Category) -> Option<&dyn Translator> {
        self.translators.get(&category).map(|t| t.as_ref())
    }

    pub fn group(&self) -> &GroupTranslator {
        &self.group
    }

    pub fn camera(&self) -> &CameraTranslator {
        &self.camera
    }

    pub fn particles(&self) -> &ParticlesTranslator {
        &self.particles
    }

    pub fn material(&self) -> &MaterialTranslator {
        &self.material
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{MemoryGraph, ObjectKind};

    #[test]
    fn test_defaults_cover_placeable_categories() {
        let registry = TranslatorRegistry::with_defaults();
        for category in [
            Category::Mesh,
            Category::Curve,
            Category::Points,
            Category::Volume,
            Category::Meta,
            Category::Light,
            Category::Empty,
        ] {
            assert!(registry.translator_for(category).is_some(), "{category:?}");
        }
        assert!(registry.translator_for(Category::Camera).is_none());
        assert!(registry.translator_for(Category::Armature).is_none());
    }

    #[test]
    fn test_default_object_attributes() {
        let mut graph = MemoryGraph::new();
        let group = graph.create_node(NodeKind::Group, "group").unwrap();
        let mut entity = SourceEntity::new("Cube", ObjectKind::Mesh);
        entity.visibility.indirect = false;

        let registry = TranslatorRegistry::with_defaults();
        let translator = registry.translator_for(Category::Mesh).unwrap();
        translator.export_object_attributes(&mut graph, &entity, group).unwrap();

        let node = graph.node(group).unwrap();
        assert_eq!(node.attribute("visibility:camera"), Some(&AttrValue::Int(1)));
        assert_eq!(node.attribute("visibility:indirect"), Some(&AttrValue::Int(0)));
        assert_eq!(node.attribute("identifier:name"), Some(&AttrValue::from("Cube")));
    }

    struct Declining;

    impl Translator for Declining {
        fn export(
            &self,
            _graph: &mut dyn SceneGraph,
            _entity: &SourceEntity,
            _db_name: &str,
        ) -> GraphResult<Option<EntityRecord>> {
            Ok(None)
        }

        fn update(
            &self,
            _graph: &mut dyn SceneGraph,
            _entity: &SourceEntity,
            _record: &mut EntityRecord,
        ) -> GraphResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = TranslatorRegistry::with_defaults();
        registry.register(Category::Volume, Box::new(Declining));

        let mut graph = MemoryGraph::new();
        let entity = SourceEntity::new("Smoke", ObjectKind::Volume);
        let translator = registry.translator_for(Category::Volume).unwrap();
        assert!(translator.export(&mut graph, &entity, "Smoke").unwrap().is_none());
        assert_eq!(graph.node_count(), 1);
    }
}
