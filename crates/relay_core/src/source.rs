//! Source scene contract.
//!
//! The host application's evaluated scene, seen through the narrow view the
//! exporter needs: entities (one per object/data block), placements (one per
//! concrete occurrence, possibly instanced), and materials. Implementations
//! must report the same [`EntityId`] for an object no matter which
//! (frame, subframe) they were last evaluated at.

use std::collections::BTreeMap;

use relay_math::{Cursor, Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{EntityId, MaterialId};

/// Errors reported by the source scene.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("failed to evaluate scene at frame {} subframe {}: {message}", cursor.frame, cursor.subframe)]
    Evaluation { cursor: Cursor, message: String },
}

/// Result type for source scene operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Host object type, before mapping to a renderer primitive category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Mesh,
    Curve,
    Points,
    /// Implicit surface; members of one family share a single representation
    Meta,
    Volume,
    Light {
        #[serde(default)]
        filter: bool,
    },
    Camera,
    Armature,
    Empty,
    /// Anything the exporter has no category for (kept for diagnostics)
    Other(String),
}

/// Per-object visibility toggles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visibility {
    /// Object is enabled for final renders
    pub render: bool,
    /// Object is enabled in the viewport
    pub viewport: bool,
    /// Instancer itself is shown in final renders
    pub instancer_render: bool,
    /// Instancer itself is shown in the viewport
    pub instancer_viewport: bool,
    /// Visible to camera rays
    pub camera: bool,
    /// Visible to indirect rays
    pub indirect: bool,
    /// Visible to transmission rays
    pub transmission: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            render: true,
            viewport: true,
            instancer_render: true,
            instancer_viewport: true,
            camera: true,
            indirect: true,
            transmission: true,
        }
    }
}

/// Per-object override of the scene-wide motion segment counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionOverride {
    pub enabled: bool,
    pub segments: u32,
    pub deform_segments: u32,
}

impl Default for MotionOverride {
    fn default() -> Self {
        Self {
            enabled: false,
            segments: 2,
            deform_segments: 2,
        }
    }
}

/// Evaluated geometry payload handed to geometry translators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Point positions (object space)
    pub points: Vec<Vec3>,
    /// Vertices per face / per curve
    pub vertex_counts: Vec<u32>,
    /// Vertex indices for each face
    pub indices: Vec<u32>,
    /// Per-point widths (curves, points)
    pub widths: Vec<f32>,
}

/// Light parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightParams {
    pub shader: String,
    pub intensity: f32,
    pub color: Vec3,
    /// Rendered alone while the scene solos lights
    pub solo: bool,
    pub mute: bool,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            shader: "PxrRectLight".to_string(),
            intensity: 1.0,
            color: Vec3::ONE,
            solo: false,
            mute: false,
        }
    }
}

/// Camera parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov: 39.6,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Settings shared by a particle system.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleSettings {
    pub id: EntityId,
    pub name: String,
    /// Object rendered at every particle, if the system instances objects
    pub instance_object: Option<EntityId>,
    /// Use the owner's material slot instead of the instanced object's material
    pub override_instance_material: bool,
    /// 1-based slot on the owning object used when overriding
    pub material_index: usize,
}

impl ParticleSettings {
    /// Whether particles are rendered as instanced objects.
    pub fn is_instancer(&self) -> bool {
        self.instance_object.is_some()
    }
}

/// An evaluated particle system attached to an owner entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleSystem {
    pub id: EntityId,
    pub name: String,
    pub settings: ParticleSettings,
    /// Particle positions (world space)
    pub points: Vec<Vec3>,
    pub widths: Vec<f32>,
}

/// One evaluated source object / data block.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceEntity {
    pub id: EntityId,
    pub name: String,
    pub kind: ObjectKind,
    pub parent: Option<EntityId>,
    /// Active material
    pub material: Option<MaterialId>,
    /// All material slots, in slot order
    pub material_slots: Vec<MaterialId>,
    pub particle_systems: Vec<ParticleSystem>,
    pub visibility: Visibility,
    pub motion: MotionOverride,
    /// Transform is animated (the object or one of its ancestors)
    pub is_transforming: bool,
    /// Shape is animated
    pub is_deforming: bool,
    /// Object spawns instanced placements of other objects
    pub is_instancer: bool,
    /// Canonical family name for implicit surfaces
    pub family: Option<String>,
    pub selected: bool,
    pub export_as_coordsys: bool,
    pub matrix_world: Mat4,
    pub geometry: Geometry,
    /// Extra user primvars (name -> flat float data)
    pub primvars: BTreeMap<String, Vec<f32>>,
    pub light: Option<LightParams>,
    pub camera: Option<CameraParams>,
}

impl SourceEntity {
    /// Create an entity with default flags at the origin.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        let name = name.into();
        Self {
            id: EntityId::object(&name),
            name,
            kind,
            parent: None,
            material: None,
            material_slots: Vec::new(),
            particle_systems: Vec::new(),
            visibility: Visibility::default(),
            motion: MotionOverride::default(),
            is_transforming: false,
            is_deforming: false,
            is_instancer: false,
            family: None,
            selected: false,
            export_as_coordsys: false,
            matrix_world: Mat4::IDENTITY,
            geometry: Geometry::default(),
            primvars: BTreeMap::new(),
            light: None,
            camera: None,
        }
    }

    /// Name of the implicit-surface family this entity belongs to.
    ///
    /// Entities without an explicit family form their own.
    pub fn family_name(&self) -> &str {
        self.family.as_deref().unwrap_or(&self.name)
    }
}

/// One concrete occurrence of an entity in the rendered scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// Underlying entity (the instanced object for instances)
    pub entity: EntityId,
    pub is_instance: bool,
    /// Instancer / particle owner for instanced placements
    pub parent: Option<EntityId>,
    /// Particle system that produced this placement
    pub particle_system: Option<EntityId>,
    /// Position of this placement within its instancer(s)
    pub persistent_id: Vec<u32>,
    pub matrix_world: Mat4,
    pub show_self: bool,
    pub show_particles: bool,
    /// Visible in the current viewport (local view)
    pub visible_in_viewport: bool,
}

impl Placement {
    /// A non-instanced placement of `entity`.
    pub fn direct(entity: EntityId, matrix_world: Mat4) -> Self {
        Self {
            entity,
            is_instance: false,
            parent: None,
            particle_system: None,
            persistent_id: Vec::new(),
            matrix_world,
            show_self: true,
            show_particles: true,
            visible_in_viewport: true,
        }
    }
}

/// A source material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMaterial {
    pub id: MaterialId,
    pub name: String,
    /// Surface shader; `None` means an empty shading network
    pub shader: Option<String>,
    /// Material emits light (mesh light)
    pub is_meshlight: bool,
}

/// The host application's evaluated scene.
pub trait SourceScene {
    /// Current evaluation point.
    fn cursor(&self) -> Cursor;

    /// Re-evaluate the whole scene at `cursor`.
    ///
    /// This is the expensive, blocking call of a motion-blur sweep.
    fn set_cursor(&mut self, cursor: Cursor) -> SourceResult<()>;

    /// All evaluated top-level entities.
    fn entities(&self) -> &[SourceEntity];

    /// All placements for the current evaluation state.
    fn placements(&self) -> &[Placement];

    /// All materials.
    fn materials(&self) -> &[SourceMaterial];

    /// Camera used for rendering, if any.
    fn active_camera(&self) -> Option<EntityId>;

    /// Look up an entity by identity.
    fn entity(&self, id: EntityId) -> Option<&SourceEntity> {
        self.entities().iter().find(|e| e.id == id)
    }

    /// Look up a material by identity.
    fn material(&self, id: MaterialId) -> Option<&SourceMaterial> {
        self.materials().iter().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_defaults_to_own_name() {
        let mut ball = SourceEntity::new("Ball.001", ObjectKind::Meta);
        assert_eq!(ball.family_name(), "Ball.001");

        ball.family = Some("Ball".to_string());
        assert_eq!(ball.family_name(), "Ball");
    }

    #[test]
    fn test_object_kind_json_forms() {
        let mesh: ObjectKind = serde_json::from_str("\"mesh\"").unwrap();
        assert_eq!(mesh, ObjectKind::Mesh);

        let filter: ObjectKind = serde_json::from_str(r#"{"light": {"filter": true}}"#).unwrap();
        assert_eq!(filter, ObjectKind::Light { filter: true });

        let other: ObjectKind = serde_json::from_str(r#"{"other": "gpencil"}"#).unwrap();
        assert_eq!(other, ObjectKind::Other("gpencil".to_string()));
    }
}
