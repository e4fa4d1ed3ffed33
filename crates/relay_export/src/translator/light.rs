//! Lights.

use relay_core::{AttrValue, GraphResult, NodeId, NodeKind, SceneGraph, SourceEntity};

use super::Translator;
use crate::category::Category;
use crate::records::EntityRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct LightTranslator;

impl Translator for LightTranslator {
    fn export(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        db_name: &str,
    ) -> GraphResult<Option<EntityRecord>> {
        let node = graph.create_node(NodeKind::Light, db_name)?;
        Ok(Some(EntityRecord::new(entity.id, db_name, Category::Light, node)))
    }

    fn update(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &mut EntityRecord,
    ) -> GraphResult<()> {
        let params = entity.light.clone().unwrap_or_default();
        graph.set_attribute(record.node, "shader", params.shader.into())?;
        graph.set_attribute(record.node, "intensity", params.intensity.into())?;
        graph.set_attribute(record.node, "lightColor", AttrValue::Floats(params.color.to_array().to_vec()))
    }

    /// Lights are visible to camera rays only when asked for.
    fn export_object_attributes(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        group: NodeId,
    ) -> GraphResult<()> {
        graph.set_attribute(group, "visibility:camera", 0_i32.into())?;
        graph.set_attribute(group, "identifier:name", entity.name.as_str().into())
    }
}
