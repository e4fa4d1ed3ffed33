//! Materials.

use relay_core::{GraphResult, NodeKind, SceneGraph, SourceMaterial};

use crate::records::MaterialRecord;

/// Builds one shared material node per source material.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialTranslator;

impl MaterialTranslator {
    /// Materials without a shader get a record but no node, so binding them
    /// is a no-op.
    pub fn export(&self, graph: &mut dyn SceneGraph, material: &SourceMaterial) -> GraphResult<MaterialRecord> {
        let mut record = MaterialRecord {
            id: material.id,
            name: material.name.clone(),
            node: None,
            is_meshlight: material.is_meshlight,
        };
        self.update(graph, material, &mut record)?;
        Ok(record)
    }

    /// Rewrite the shader on the existing node.
    ///
    /// Returns `true` when the node was created by this call, in which case
    /// nothing is bound to it yet.
    pub fn update(
        &self,
        graph: &mut dyn SceneGraph,
        material: &SourceMaterial,
        record: &mut MaterialRecord,
    ) -> GraphResult<bool> {
        record.is_meshlight = material.is_meshlight;
        let Some(shader) = &material.shader else {
            return Ok(false);
        };

        let created = record.node.is_none();
        let node = match record.node {
            Some(node) => node,
            None => graph.create_node(NodeKind::Material, &material.name)?,
        };
        record.node = Some(node);
        graph.set_attribute(node, "shader", shader.as_str().into())?;
        graph.set_attribute(node, "meshlight", material.is_meshlight.into())?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{AttrValue, MaterialId, MemoryGraph};

    fn material(shader: Option<&str>) -> SourceMaterial {
        SourceMaterial {
            id: MaterialId::from_name("Paint"),
            name: "Paint".into(),
            shader: shader.map(str::to_string),
            is_meshlight: false,
        }
    }

    #[test]
    fn test_empty_network_has_no_node() {
        let mut graph = MemoryGraph::new();
        let record = MaterialTranslator.export(&mut graph, &material(None)).unwrap();
        assert!(record.node.is_none());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_update_rewrites_same_node() {
        let mut graph = MemoryGraph::new();
        let mut record = MaterialTranslator.export(&mut graph, &material(Some("PxrSurface"))).unwrap();
        let node = record.node.unwrap();

        let created = MaterialTranslator
            .update(&mut graph, &material(Some("PxrDisney")), &mut record)
            .unwrap();
        assert!(!created);
        assert_eq!(record.node, Some(node));
        assert_eq!(graph.node(node).unwrap().attribute("shader"), Some(&AttrValue::from("PxrDisney")));
    }
}
