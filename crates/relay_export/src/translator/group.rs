//! Placement groups.

use relay_core::{GraphResult, NodeId, NodeKind, SceneGraph};
use relay_math::Mat4;

/// Creates group nodes and writes their transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupTranslator;

impl GroupTranslator {
    pub fn export(&self, graph: &mut dyn SceneGraph, db_name: &str) -> GraphResult<NodeId> {
        graph.create_node(NodeKind::Group, db_name)
    }

    /// Static transform.
    pub fn update_transform(&self, graph: &mut dyn SceneGraph, node: NodeId, matrix: Mat4) -> GraphResult<()> {
        graph.set_transform(node, matrix)
    }

    /// Reserve one transform sample per offset.
    pub fn update_transform_num_samples(
        &self,
        graph: &mut dyn SceneGraph,
        node: NodeId,
        steps: &[f32],
    ) -> GraphResult<()> {
        graph.set_transform_num_samples(node, steps)
    }

    pub fn update_transform_sample(
        &self,
        graph: &mut dyn SceneGraph,
        node: NodeId,
        index: usize,
        matrix: Mat4,
    ) -> GraphResult<()> {
        graph.set_transform_sample(node, index, matrix)
    }

    /// Static transform, or reserve `steps` and write the first sample.
    pub fn place(&self, graph: &mut dyn SceneGraph, node: NodeId, steps: &[f32], matrix: Mat4) -> GraphResult<()> {
        if steps.is_empty() {
            return self.update_transform(graph, node, matrix);
        }
        self.update_transform_num_samples(graph, node, steps)?;
        self.update_transform_sample(graph, node, 0, matrix)
    }
}
