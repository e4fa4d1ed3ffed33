//! Point-rendered particle systems.

use relay_core::{AttrValue, GraphResult, NodeKind, ParticleSystem, SceneGraph};
use relay_math::points_as_floats;

use crate::category::Category;
use crate::records::EntityRecord;

/// Exports particle systems as points nodes owned by their emitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticlesTranslator;

impl ParticlesTranslator {
    pub fn export_system(
        &self,
        graph: &mut dyn SceneGraph,
        owner: &EntityRecord,
        psys: &ParticleSystem,
    ) -> GraphResult<EntityRecord> {
        let db_name = format!("{}|{}", owner.db_name, psys.name);
        let node = graph.create_node(NodeKind::Points, &db_name)?;
        let mut record = EntityRecord::new(psys.id, db_name, Category::Particles, node);
        record.parent = Some(owner.id);
        Ok(record)
    }

    pub fn update_system(
        &self,
        graph: &mut dyn SceneGraph,
        psys: &ParticleSystem,
        record: &mut EntityRecord,
    ) -> GraphResult<()> {
        if record.is_deforming {
            graph.set_deform_num_samples(record.node, &record.deform_motion_steps)?;
        }
        let points = points_as_floats(&psys.points).to_vec();
        graph.set_primvar(record.node, "P", AttrValue::Floats(points))?;
        graph.set_primvar(record.node, "width", AttrValue::Floats(psys.widths.clone()))
    }

    pub fn export_system_sample(
        &self,
        graph: &mut dyn SceneGraph,
        record: &EntityRecord,
        psys: &ParticleSystem,
        index: usize,
    ) -> GraphResult<()> {
        let points = points_as_floats(&psys.points).to_vec();
        graph.set_primvar_sample(record.node, "P", index, AttrValue::Floats(points))
    }
}
