//! Primitive categories.

use relay_core::{ObjectKind, SourceEntity};
use serde::Serialize;
use thiserror::Error;

/// Renderer primitive category of an entity or record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Mesh,
    Curve,
    Points,
    /// Implicit surface family
    Meta,
    Volume,
    /// Particle system owned by another entity
    Particles,
    Light,
    LightFilter,
    Camera,
    Armature,
    Empty,
    /// Synthetic wrapper group
    Group,
}

/// An entity whose kind has no renderer category.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unsupported object type '{tag}' on '{name}'")]
pub struct UnsupportedCategory {
    pub name: String,
    pub tag: String,
}

impl Category {
    /// Category of a source entity.
    pub fn detect(entity: &SourceEntity) -> Result<Self, UnsupportedCategory> {
        let category = match &entity.kind {
            ObjectKind::Mesh => Category::Mesh,
            ObjectKind::Curve => Category::Curve,
            ObjectKind::Points => Category::Points,
            ObjectKind::Meta => Category::Meta,
            ObjectKind::Volume => Category::Volume,
            ObjectKind::Light { filter: true } => Category::LightFilter,
            ObjectKind::Light { filter: false } => Category::Light,
            ObjectKind::Camera => Category::Camera,
            ObjectKind::Armature => Category::Armature,
            ObjectKind::Empty => Category::Empty,
            ObjectKind::Other(tag) => {
                return Err(UnsupportedCategory {
                    name: entity.name.clone(),
                    tag: tag.clone(),
                })
            }
        };
        Ok(category)
    }

    /// Categories exported as part of their owner, never placed on their own.
    pub fn is_auxiliary(self) -> bool {
        matches!(self, Category::Camera | Category::Armature | Category::LightFilter)
    }

    /// Whether the category carries point data that can deform.
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            Category::Mesh | Category::Curve | Category::Points | Category::Meta | Category::Volume
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let mesh = SourceEntity::new("Cube", ObjectKind::Mesh);
        assert_eq!(Category::detect(&mesh), Ok(Category::Mesh));

        let filter = SourceEntity::new("Blocker", ObjectKind::Light { filter: true });
        assert_eq!(Category::detect(&filter), Ok(Category::LightFilter));
        assert!(Category::LightFilter.is_auxiliary());
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let pencil = SourceEntity::new("Sketch", ObjectKind::Other("gpencil".into()));
        let err = Category::detect(&pencil).unwrap_err();
        assert_eq!(err.tag, "gpencil");
        assert_eq!(err.to_string(), "unsupported object type 'gpencil' on 'Sketch'");
    }

    #[test]
    fn test_auxiliary_categories() {
        assert!(Category::Camera.is_auxiliary());
        assert!(Category::Armature.is_auxiliary());
        assert!(!Category::Empty.is_auxiliary());
        assert!(!Category::Light.is_auxiliary());
    }
}
