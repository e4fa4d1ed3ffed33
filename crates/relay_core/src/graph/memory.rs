//! In-memory scene graph.
//!
//! A [`SceneGraph`] that records everything written to it so exports can be
//! inspected, diffed, dumped as JSON, or printed as an outline. Every
//! sample slot counts its writes, which makes "written exactly once"
//! checkable.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use relay_math::Mat4;
use serde::Serialize;

use super::{AttrValue, GraphError, GraphResult, Hidden, NodeId, NodeKind, SceneGraph};

/// Time-sampled values with per-slot write counts.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SampleTrack<T> {
    /// Sample times; empty for a single static value
    pub times: Vec<f32>,
    pub samples: Vec<Option<T>>,
    pub writes: Vec<u32>,
}

impl<T> SampleTrack<T> {
    fn reserve(&mut self, times: &[f32]) {
        if self.times == times && !times.is_empty() {
            return;
        }
        self.times = times.to_vec();
        self.samples = (0..times.len()).map(|_| None).collect();
        self.writes = vec![0; times.len()];
    }

    fn set_static(&mut self, value: T) {
        self.times.clear();
        self.samples = vec![Some(value)];
        self.writes = vec![1];
    }

    fn write(&mut self, index: usize, value: T) -> bool {
        match self.samples.get_mut(index) {
            Some(slot) => {
                *slot = Some(value);
                self.writes[index] += 1;
                true
            }
            None => false,
        }
    }

    /// Number of sample slots.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One node of a [`MemoryGraph`].
#[derive(Clone, Debug, Serialize)]
pub struct MemoryNode {
    pub kind: NodeKind,
    pub name: String,
    pub children: Vec<NodeId>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub primvars: BTreeMap<String, AttrValue>,
    pub transform: SampleTrack<Mat4>,
    pub deform: SampleTrack<BTreeMap<String, AttrValue>>,
    pub hidden: Hidden,
    pub inherit_transform: bool,
    pub material: Option<NodeId>,
}

impl MemoryNode {
    fn new(kind: NodeKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            children: Vec::new(),
            attributes: BTreeMap::new(),
            primvars: BTreeMap::new(),
            transform: SampleTrack::default(),
            deform: SampleTrack::default(),
            hidden: Hidden::Inherit,
            inherit_transform: true,
            material: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Inspectable in-memory [`SceneGraph`].
#[derive(Clone, Debug, Serialize)]
pub struct MemoryGraph {
    nodes: Vec<Option<MemoryNode>>,
    root: NodeId,
    options: BTreeMap<String, AttrValue>,
    coordinate_systems: Vec<NodeId>,
    #[serde(skip)]
    rejected: HashSet<NodeKind>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// Create a graph holding only the root group.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(MemoryNode::new(NodeKind::Group, "root"))],
            root: NodeId(0),
            options: BTreeMap::new(),
            coordinate_systems: Vec::new(),
            rejected: HashSet::new(),
        }
    }

    /// Make every later `create_node` of `kind` fail.
    pub fn reject_kind(&mut self, kind: NodeKind) {
        self.rejected.insert(kind);
    }

    pub fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> GraphResult<&mut MemoryNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(|n| n.as_mut())
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Live nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Live nodes of one kind.
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.iter().flatten().filter(|n| n.kind == kind).count()
    }

    /// Iterate live nodes with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &MemoryNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    /// First live node with the given name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// Nodes that list `child` among their children.
    pub fn parents_of(&self, child: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.children.contains(&child))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn option(&self, name: &str) -> Option<&AttrValue> {
        self.options.get(name)
    }

    pub fn coordinate_systems(&self) -> &[NodeId] {
        &self.coordinate_systems
    }

    /// Indented hierarchy below the root, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        let mut visiting = Vec::new();

        while let Some((id, depth)) = stack.pop() {
            visiting.truncate(depth);
            let Some(node) = self.node(id) else {
                continue;
            };
            let samples = node.transform.len();
            let _ = writeln!(
                out,
                "{:indent$}{:?} {}{}{}",
                "",
                node.kind,
                node.name,
                if samples > 1 { format!(" [{samples} samples]") } else { String::new() },
                if node.hidden == Hidden::Hide { " (hidden)" } else { "" },
                indent = depth * 2
            );
            if visiting.contains(&id) {
                continue;
            }
            visiting.push(id);
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }
}

impl SceneGraph for MemoryGraph {
    fn root(&self) -> NodeId {
        self.root
    }

    fn reset(&mut self) -> GraphResult<()> {
        self.nodes.truncate(1);
        self.nodes[0] = Some(MemoryNode::new(NodeKind::Group, "root"));
        self.options.clear();
        self.coordinate_systems.clear();
        Ok(())
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> GraphResult<NodeId> {
        if self.rejected.contains(&kind) {
            return Err(GraphError::Rejected {
                kind,
                name: name.to_string(),
                reason: "node kind disabled".to_string(),
            });
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(MemoryNode::new(kind, name)));
        Ok(id)
    }

    fn delete_node(&mut self, node: NodeId) -> GraphResult<()> {
        if node == self.root {
            return Err(GraphError::RootDeletion);
        }
        self.node_mut(node)?;
        self.nodes[node.0 as usize] = None;
        for other in self.nodes.iter_mut().flatten() {
            other.children.retain(|c| *c != node);
            if other.material == Some(node) {
                other.material = None;
            }
        }
        self.coordinate_systems.retain(|c| *c != node);
        Ok(())
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) -> GraphResult<()> {
        self.node_mut(child)?;
        let parent = self.node_mut(parent)?;
        if !parent.children.contains(&child) {
            parent.children.push(child);
        }
        Ok(())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: AttrValue) -> GraphResult<()> {
        self.node_mut(node)?.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn set_option(&mut self, name: &str, value: AttrValue) -> GraphResult<()> {
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    fn set_primvar(&mut self, node: NodeId, name: &str, value: AttrValue) -> GraphResult<()> {
        self.node_mut(node)?.primvars.insert(name.to_string(), value);
        Ok(())
    }

    fn set_deform_num_samples(&mut self, node: NodeId, times: &[f32]) -> GraphResult<()> {
        self.node_mut(node)?.deform.reserve(times);
        Ok(())
    }

    fn set_primvar_sample(
        &mut self,
        node: NodeId,
        name: &str,
        index: usize,
        value: AttrValue,
    ) -> GraphResult<()> {
        let track = &mut self.node_mut(node)?.deform;
        let reserved = track.len();
        let mut sample = track
            .samples
            .get(index)
            .cloned()
            .flatten()
            .unwrap_or_default();
        sample.insert(name.to_string(), value);
        if !track.write(index, sample) {
            return Err(GraphError::SampleOutOfRange { node, index, reserved });
        }
        Ok(())
    }

    fn set_transform(&mut self, node: NodeId, matrix: Mat4) -> GraphResult<()> {
        self.node_mut(node)?.transform.set_static(matrix);
        Ok(())
    }

    fn set_transform_num_samples(&mut self, node: NodeId, times: &[f32]) -> GraphResult<()> {
        self.node_mut(node)?.transform.reserve(times);
        Ok(())
    }

    fn set_transform_sample(&mut self, node: NodeId, index: usize, matrix: Mat4) -> GraphResult<()> {
        let track = &mut self.node_mut(node)?.transform;
        let reserved = track.len();
        if !track.write(index, matrix) {
            return Err(GraphError::SampleOutOfRange { node, index, reserved });
        }
        Ok(())
    }

    fn num_transform_samples(&self, node: NodeId) -> usize {
        self.node(node).map_or(0, |n| n.transform.len())
    }

    fn set_hidden(&mut self, node: NodeId, hidden: Hidden) -> GraphResult<()> {
        self.node_mut(node)?.hidden = hidden;
        Ok(())
    }

    fn set_inherit_transform(&mut self, node: NodeId, inherit: bool) -> GraphResult<()> {
        self.node_mut(node)?.inherit_transform = inherit;
        Ok(())
    }

    fn bind_material(&mut self, node: NodeId, material: NodeId) -> GraphResult<()> {
        self.node_mut(material)?;
        self.node_mut(node)?.material = Some(material);
        Ok(())
    }

    fn add_coordinate_system(&mut self, node: NodeId) -> GraphResult<()> {
        self.node_mut(node)?;
        if !self.coordinate_systems.contains(&node) {
            self.coordinate_systems.push(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_and_counts() {
        let mut graph = MemoryGraph::new();
        let group = graph.create_node(NodeKind::Group, "group").unwrap();
        let mesh = graph.create_node(NodeKind::Mesh, "mesh").unwrap();
        graph.add_child(graph.root(), group).unwrap();
        graph.add_child(group, mesh).unwrap();
        graph.add_child(group, mesh).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.count_kind(NodeKind::Mesh), 1);
        assert_eq!(graph.node(group).unwrap().children, vec![mesh]);
        assert_eq!(graph.parents_of(mesh), vec![group]);
        assert_eq!(graph.find("mesh"), Some(mesh));
    }

    #[test]
    fn test_samples_reserved_before_written() {
        let mut graph = MemoryGraph::new();
        let node = graph.create_node(NodeKind::Group, "moving").unwrap();
        assert_eq!(graph.num_transform_samples(node), 0);

        graph.set_transform_num_samples(node, &[-0.25, 0.0, 0.25]).unwrap();
        assert_eq!(graph.num_transform_samples(node), 3);

        graph.set_transform_sample(node, 2, Mat4::IDENTITY).unwrap();
        let err = graph.set_transform_sample(node, 3, Mat4::IDENTITY).unwrap_err();
        assert_eq!(err, GraphError::SampleOutOfRange { node, index: 3, reserved: 3 });

        let track = &graph.node(node).unwrap().transform;
        assert_eq!(track.writes, vec![0, 0, 1]);
    }

    #[test]
    fn test_reserving_same_times_keeps_samples() {
        let mut graph = MemoryGraph::new();
        let node = graph.create_node(NodeKind::Group, "moving").unwrap();
        graph.set_transform_num_samples(node, &[0.0, 0.5]).unwrap();
        graph.set_transform_sample(node, 0, Mat4::IDENTITY).unwrap();
        graph.set_transform_num_samples(node, &[0.0, 0.5]).unwrap();

        assert_eq!(graph.node(node).unwrap().transform.writes, vec![1, 0]);
    }

    #[test]
    fn test_static_transform_is_one_sample() {
        let mut graph = MemoryGraph::new();
        let node = graph.create_node(NodeKind::Group, "still").unwrap();
        graph.set_transform(node, Mat4::IDENTITY).unwrap();
        assert_eq!(graph.num_transform_samples(node), 1);
    }

    #[test]
    fn test_deform_samples() {
        let mut graph = MemoryGraph::new();
        let mesh = graph.create_node(NodeKind::Mesh, "mesh").unwrap();
        graph.set_deform_num_samples(mesh, &[0.0, 0.5]).unwrap();
        graph.set_primvar_sample(mesh, "P", 1, AttrValue::Floats(vec![1.0])).unwrap();

        assert!(graph.set_primvar_sample(mesh, "P", 2, AttrValue::Floats(vec![])).is_err());
        let deform = &graph.node(mesh).unwrap().deform;
        assert_eq!(deform.writes, vec![0, 1]);
    }

    #[test]
    fn test_material_bound_by_reference() {
        let mut graph = MemoryGraph::new();
        let material = graph.create_node(NodeKind::Material, "mat").unwrap();
        let group = graph.create_node(NodeKind::Group, "group").unwrap();
        graph.bind_material(group, material).unwrap();
        graph.set_attribute(material, "shader", "PxrDisney".into()).unwrap();

        let bound = graph.node(group).unwrap().material.unwrap();
        assert_eq!(graph.node(bound).unwrap().attribute("shader"), Some(&AttrValue::from("PxrDisney")));
    }

    #[test]
    fn test_delete_and_reset() {
        let mut graph = MemoryGraph::new();
        let group = graph.create_node(NodeKind::Group, "group").unwrap();
        graph.add_child(graph.root(), group).unwrap();
        graph.delete_node(group).unwrap();
        assert!(graph.node(graph.root()).unwrap().children.is_empty());
        assert_eq!(graph.delete_node(graph.root()), Err(GraphError::RootDeletion));

        graph.create_node(NodeKind::Light, "light").unwrap();
        graph.set_option("Ri:Frame", 1_i32.into()).unwrap();
        graph.reset().unwrap();
        assert_eq!(graph.node_count(), 1);
        assert!(graph.option("Ri:Frame").is_none());
    }

    #[test]
    fn test_rejected_kind() {
        let mut graph = MemoryGraph::new();
        graph.reject_kind(NodeKind::Camera);
        assert!(matches!(
            graph.create_node(NodeKind::Camera, "cam"),
            Err(GraphError::Rejected { kind: NodeKind::Camera, .. })
        ));
    }

    #[test]
    fn test_outline() {
        let mut graph = MemoryGraph::new();
        let group = graph.create_node(NodeKind::Group, "group").unwrap();
        let mesh = graph.create_node(NodeKind::Mesh, "mesh").unwrap();
        graph.add_child(graph.root(), group).unwrap();
        graph.add_child(group, mesh).unwrap();

        assert_eq!(graph.outline(), "Group root\n  Group group\n    Mesh mesh\n");
    }
}
