//! Cameras.

use relay_core::{AttrValue, GraphResult, NodeKind, SceneGraph, SourceEntity};
use relay_math::Mat4Ext;

use super::Translator;
use crate::category::Category;
use crate::records::EntityRecord;

/// Cameras are exported by the orchestrator, never through placements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraTranslator;

impl CameraTranslator {
    /// Register a non-rendering camera as a named coordinate system.
    pub fn export_coordinate_system(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &EntityRecord,
    ) -> GraphResult<()> {
        graph.set_transform(record.node, entity.matrix_world)?;
        graph.set_attribute(
            record.node,
            "coordsys:matrix",
            AttrValue::Floats(entity.matrix_world.to_row_major().to_vec()),
        )?;
        graph.add_coordinate_system(record.node)
    }
}

impl Translator for CameraTranslator {
    fn export(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        db_name: &str,
    ) -> GraphResult<Option<EntityRecord>> {
        let node = graph.create_node(NodeKind::Camera, db_name)?;
        Ok(Some(EntityRecord::new(entity.id, db_name, Category::Camera, node)))
    }

    fn update(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &mut EntityRecord,
    ) -> GraphResult<()> {
        let params = entity.camera.clone().unwrap_or_default();
        graph.set_attribute(record.node, "fov", params.fov.into())?;
        graph.set_attribute(record.node, "nearClip", params.near.into())?;
        graph.set_attribute(record.node, "farClip", params.far.into())
    }
}
