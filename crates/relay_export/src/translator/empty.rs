//! Empties: transform-only nodes that other entities may hang under.

use relay_core::{GraphResult, NodeKind, SceneGraph, SourceEntity};

use super::Translator;
use crate::category::Category;
use crate::records::EntityRecord;

/// Empties own a group node; their single placement reuses it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTranslator;

impl Translator for EmptyTranslator {
    fn export(
        &self,
        graph: &mut dyn SceneGraph,
        entity: &SourceEntity,
        db_name: &str,
    ) -> GraphResult<Option<EntityRecord>> {
        let node = graph.create_node(NodeKind::Group, db_name)?;
        Ok(Some(EntityRecord::new(entity.id, db_name, Category::Empty, node)))
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
