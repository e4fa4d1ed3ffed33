//! Scene file loading.
//!
//! Scene files are JSON documents deserialized into a
//! [`SceneDescription`], validated, and evaluated at their current frame.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use super::desc::SceneDescription;
use super::Scene;

/// Errors that can occur during scene loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Object with an empty name")]
    EmptyName,

    #[error("Duplicate object name: {0}")]
    DuplicateName(String),

    #[error("Object '{object}' references unknown {what} '{name}'")]
    UnknownReference {
        object: String,
        what: &'static str,
        name: String,
    },

    #[error("Parent cycle through object '{0}'")]
    ParentCycle(String),
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Load a scene file.
///
/// # Example
///
/// ```ignore
/// use relay_core::load_scene;
///
/// let scene = load_scene("shot.json")?;
/// println!("Loaded {}", scene.name());
/// ```
pub fn load_scene<P: AsRef<Path>>(path: P) -> LoadResult<Scene> {
    let path = path.as_ref();
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");
    let content = std::fs::read_to_string(path)?;
    load_scene_from_str(&content, name)
}

/// Load a scene from a JSON string (useful for testing).
pub fn load_scene_from_str(content: &str, name: &str) -> LoadResult<Scene> {
    let mut desc: SceneDescription = serde_json::from_str(content)?;
    if desc.name.is_empty() {
        desc.name = name.to_string();
    }

    let scene = Scene::from_description(desc)?;
    log::info!(
        "Loaded scene '{}' with {} objects, {} materials",
        scene.name(),
        scene.description().objects.len(),
        scene.description().materials.len()
    );
    Ok(scene)
}

/// Check names are unique and every reference resolves.
pub(super) fn validate(desc: &SceneDescription) -> LoadResult<()> {
    let mut names = HashSet::new();
    for object in &desc.objects {
        if object.name.is_empty() {
            return Err(LoadError::EmptyName);
        }
        if !names.insert(object.name.as_str()) {
            return Err(LoadError::DuplicateName(object.name.clone()));
        }
    }
    let materials: HashSet<&str> = desc.materials.iter().map(|m| m.name.as_str()).collect();

    let unknown = |object: &str, what: &'static str, name: &str| LoadError::UnknownReference {
        object: object.to_string(),
        what,
        name: name.to_string(),
    };

    for object in &desc.objects {
        if let Some(parent) = &object.parent {
            if !names.contains(parent.as_str()) {
                return Err(unknown(&object.name, "parent", parent));
            }
        }
        for material in object.material.iter().chain(object.material_slots.iter()) {
            if !materials.contains(material.as_str()) {
                return Err(unknown(&object.name, "material", material));
            }
        }
        if let Some(instancer) = &object.instancer {
            for proto in &instancer.prototypes {
                if !names.contains(proto.as_str()) {
                    return Err(unknown(&object.name, "prototype", proto));
                }
            }
        }
        for psys in &object.particles {
            if let Some(instanced) = &psys.instance_object {
                if !names.contains(instanced.as_str()) {
                    return Err(unknown(&object.name, "instance object", instanced));
                }
            }
        }
    }

    if let Some(camera) = &desc.camera {
        if !names.contains(camera.as_str()) {
            return Err(unknown(&desc.name, "camera", camera));
        }
    }

    let parents: HashMap<&str, &str> = desc
        .objects
        .iter()
        .filter_map(|o| o.parent.as_deref().map(|p| (o.name.as_str(), p)))
        .collect();
    for object in &desc.objects {
        let mut seen = HashSet::new();
        let mut current = object.name.as_str();
        while let Some(&parent) = parents.get(current) {
            if !seen.insert(current) {
                return Err(LoadError::ParentCycle(object.name.clone()));
            }
            current = parent;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;
    use crate::source::{ObjectKind, SourceScene};

    #[test]
    fn test_load_simple_scene() {
        let json = r#"{
            "frame": 4,
            "materials": [{ "name": "Grey", "shader": "PxrSurface" }],
            "objects": [
                { "name": "Cam", "kind": "camera" },
                {
                    "name": "Cube",
                    "kind": "mesh",
                    "material": "Grey",
                    "keys": [{ "time": 0, "translate": [1, 2, 3] }],
                    "geometry": {
                        "points": [[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]],
                        "vertex_counts": [4],
                        "indices": [0, 1, 2, 3]
                    }
                }
            ],
            "camera": "Cam"
        }"#;

        let scene = load_scene_from_str(json, "test").unwrap();
        assert_eq!(scene.name(), "test");
        assert_eq!(scene.cursor().frame, 4);
        assert_eq!(scene.entities().len(), 2);
        assert_eq!(scene.active_camera(), Some(EntityId::object("Cam")));

        let cube = scene.entity(EntityId::object("Cube")).unwrap();
        assert_eq!(cube.kind, ObjectKind::Mesh);
        assert!(cube.material.is_some());
        assert_eq!(cube.geometry.points.len(), 4);
        let origin = cube.matrix_world.transform_point3(relay_math::Vec3::ZERO);
        assert!((origin.z - 3.0).abs() < 0.001);

        let camera = scene.entity(EntityId::object("Cam")).unwrap();
        assert!(camera.camera.is_some());
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let json = r#"{ "objects": [{ "name": "A", "kind": "mesh", "parent": "Nope" }] }"#;
        let err = load_scene_from_str(json, "test").unwrap_err();
        assert!(matches!(err, LoadError::UnknownReference { what: "parent", .. }));
    }

    #[test]
    fn test_parent_cycle_is_rejected() {
        let json = r#"{ "objects": [
            { "name": "A", "kind": "empty", "parent": "B" },
            { "name": "B", "kind": "empty", "parent": "A" }
        ] }"#;
        let err = load_scene_from_str(json, "test").unwrap_err();
        assert!(matches!(err, LoadError::ParentCycle(_)));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let json = r#"{ "objects": [
            { "name": "A", "kind": "mesh" },
            { "name": "A", "kind": "curve" }
        ] }"#;
        let err = load_scene_from_str(json, "test").unwrap_err();
        assert!(matches!(err, LoadError::DuplicateName(name) if name == "A"));
    }

    #[test]
    fn test_invalid_json() {
        let err = load_scene_from_str("{ not json", "test").unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }
}
