//! Point-based geometry (meshes, curves, points, volumes, blobbies).

use relay_core::{AttrValue, GraphResult, NodeId, NodeKind, SceneGraph, SourceEntity};
use relay_math::points_as_floats;

use super::Translator;
use crate::category::Category;
use crate::records::EntityRecord;

/// Translator for every geometry category; only the node kind and the
/// topology primvars differ.
#[derive(Debug, Clone, Copy)]
pub struct GeometryTranslator {
    category: Category,
    kind: NodeKind,
}

impl GeometryTranslator {
    pub fn new(category: Category, kind: NodeKind) -> Self {
        Self { category, kind }
    }

    fn write_topology(&self, graph: &mut dyn SceneGraph, node: NodeId, entity: &SourceEntity) -> GraphResult<()> {
        let geometry = &entity.geometry;
        let counts: Vec<i32> = geometry.vertex_counts.iter().map(|c| *c as i32).collect();

        match self.kind {
            NodeKind::Mesh => {
                let indices: Vec<i32> = geometry.indices.iter().map(|i| *i as i32).collect();
                graph.set_primvar(node, "Ri:nvertices", counts.into())?;
                graph.set_primvar(node, "Ri:vertices", indices.into())?;
            }
            NodeKind::Curves => {
                graph.set_primvar(node, "Ri:nvertices", counts.into())?;
                graph.set_primvar(node, "width", geometry.widths.clone().into())?;
            }
            NodeKind::Points => {
                graph.set_primvar(node, "width", geometry.widths.clone().into())?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Translator for GeometryTranslator {
    fn export(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        db_name: &str,
    ) -> GraphResult<Option<EntityRecord>> {
        let node = graph.create_node(self.kind, db_name)?;
        Ok(Some(EntityRecord::new(entity.id, db_name, self.category, node)))
    }

    fn update(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        record: &mut EntityRecord,
    ) -> GraphResult<()> {
        if record.is_deforming {
            graph.set_deform_num_samples(record.node, &record.deform_motion_steps)?;
        }
        let points = points_as_floats(&entity.geometry.points).to_vec();
        graph.set_primvar(record.node, "P", AttrValue::Floats(points))?;
        self.write_topology(graph, record.node, entity)
    }

    fn export_deform_sample(
        &self,
        graph: &mut dyn SceneGraph,
        record: &EntityRecord,
        entity: &SourceEntity,
        index: usize,
    ) -> GraphResult<()> {
        let points = points_as_floats(&entity.geometry.points).to_vec();
        graph.set_primvar_sample(record.node, "P", index, AttrValue::Floats(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{MemoryGraph, ObjectKind};
    use relay_math::Vec3;

    fn quad() -> SourceEntity {
        let mut entity = SourceEntity::new("Quad", ObjectKind::Mesh);
        entity.geometry.points = vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
        entity.geometry.vertex_counts = vec![4];
        entity.geometry.indices = vec![0, 1, 2, 3];
        entity
    }

    #[test]
    fn test_mesh_export_and_update() {
        let mut graph = MemoryGraph::new();
        let translator = GeometryTranslator::new(Category::Mesh, NodeKind::Mesh);
        let entity = quad();

        let mut record = translator.export(&mut graph, &entity, "Quad").unwrap().unwrap();
        translator.update(&mut graph, &entity, &mut record).unwrap();

        let node = graph.node(record.node).unwrap();
        assert_eq!(node.kind, NodeKind::Mesh);
        assert_eq!(node.primvars["P"].as_floats().map(|p| p.len()), Some(12));
        assert_eq!(node.primvars["Ri:nvertices"], AttrValue::Ints(vec![4]));
        assert!(node.deform.is_empty());
    }

    #[test]
    fn test_deforming_update_reserves_samples() {
        let mut graph = MemoryGraph::new();
        let translator = GeometryTranslator::new(Category::Mesh, NodeKind::Mesh);
        let entity = quad();

        let mut record = translator.export(&mut graph, &entity, "Quad").unwrap().unwrap();
        record.is_deforming = true;
        record.deform_motion_steps = vec![-0.25, 0.25];
        translator.update(&mut graph, &entity, &mut record).unwrap();
        translator.export_deform_sample(&mut graph, &record, &entity, 1).unwrap();

        let deform = &graph.node(record.node).unwrap().deform;
        assert_eq!(deform.times, vec![-0.25, 0.25]);
        assert_eq!(deform.writes, vec![0, 1]);
        assert!(translator.export_deform_sample(&mut graph, &record, &entity, 2).is_err());
    }
}
