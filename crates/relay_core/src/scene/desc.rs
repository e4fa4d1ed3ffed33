//! Scene description types.
//!
//! These types mirror the JSON scene file before evaluation. A description
//! holds keyframes; [`Scene`](super::Scene) turns it into evaluated
//! entities and placements at a given cursor.

use std::collections::BTreeMap;

use relay_math::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::source::{CameraParams, Geometry, LightParams, MotionOverride, ObjectKind, Visibility};

fn one() -> Vec3 {
    Vec3::ONE
}

fn default_spacing() -> f32 {
    1.0
}

fn default_slot() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// A complete scene file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    /// Scene name (usually from filename)
    pub name: String,

    /// Current frame
    pub frame: i32,

    pub objects: Vec<ObjectDesc>,

    pub materials: Vec<MaterialDesc>,

    /// Name of the render camera object
    pub camera: Option<String>,

    /// Export options block, interpreted by the exporter
    pub options: Option<serde_json::Value>,
}

impl SceneDescription {
    /// Create an empty description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_frame(mut self, frame: i32) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_object(mut self, object: ObjectDesc) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_material(mut self, material: MaterialDesc) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_camera(mut self, name: impl Into<String>) -> Self {
        self.camera = Some(name.into());
        self
    }
}

/// A transform keyframe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformKey {
    /// Time in frames
    pub time: f32,

    #[serde(default)]
    pub translate: Vec3,

    /// Euler rotation XYZ in degrees
    #[serde(default)]
    pub rotate: Vec3,

    #[serde(default = "one")]
    pub scale: Vec3,
}

impl TransformKey {
    /// A translation-only key.
    pub fn at(time: f32, translate: Vec3) -> Self {
        Self {
            time,
            translate,
            rotate: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    /// Convert to a matrix. Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotate.x.to_radians(),
            self.rotate.y.to_radians(),
            self.rotate.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translate)
    }

    fn lerp(&self, other: &TransformKey, t: f32) -> TransformKey {
        TransformKey {
            time: self.time + (other.time - self.time) * t,
            translate: self.translate.lerp(other.translate, t),
            rotate: self.rotate.lerp(other.rotate, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

/// A deformation keyframe: every point is displaced by `offset`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeformKey {
    pub time: f32,
    pub offset: Vec3,
}

/// A point instancer spawning placements of prototype objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancerDesc {
    /// Names of prototype objects
    pub prototypes: Vec<String>,

    /// Prototype indices (which prototype each instance uses)
    pub proto_indices: Vec<u32>,

    /// Instance positions (instancer space)
    pub positions: Vec<Vec3>,

    /// Instance scales (uniform or per-axis)
    pub scales: Option<Vec<Vec3>>,

    /// Whether the instancer object itself renders
    pub show_instancer: bool,
}

impl InstancerDesc {
    /// Get the transform matrix for a specific instance.
    pub fn instance_matrix(&self, index: usize) -> Mat4 {
        let Some(&translation) = self.positions.get(index) else {
            return Mat4::IDENTITY;
        };

        let scale = self
            .scales
            .as_ref()
            .and_then(|s| s.get(index))
            .copied()
            .unwrap_or(Vec3::ONE);

        Mat4::from_scale_rotation_translation(scale, Quat::IDENTITY, translation)
    }

    /// Prototype name used by instance `index`.
    pub fn prototype_for(&self, index: usize) -> Option<&str> {
        let proto_idx = self.proto_indices.get(index).copied().unwrap_or(0) as usize;
        self.prototypes
            .get(proto_idx)
            .or_else(|| self.prototypes.first())
            .map(String::as_str)
    }
}

/// A simple ballistic particle system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticleDesc {
    pub name: String,

    pub count: u32,

    /// Distance between particles along the emitter's X axis at time zero
    #[serde(default = "default_spacing")]
    pub spacing: f32,

    /// Velocity in units per frame
    #[serde(default)]
    pub velocity: Vec3,

    /// Object instanced at every particle
    #[serde(default)]
    pub instance_object: Option<String>,

    #[serde(default)]
    pub override_instance_material: bool,

    /// 1-based material slot on the emitter used when overriding
    #[serde(default = "default_slot")]
    pub material_index: usize,
}

impl ParticleDesc {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            spacing: 1.0,
            velocity: Vec3::ZERO,
            instance_object: None,
            override_instance_material: false,
            material_index: 1,
        }
    }

    pub fn instancing(mut self, object: impl Into<String>) -> Self {
        self.instance_object = Some(object.into());
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }
}

/// A material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub name: String,

    /// Surface shader; absent for an empty shading network
    #[serde(default)]
    pub shader: Option<String>,

    #[serde(default)]
    pub is_meshlight: bool,
}

impl MaterialDesc {
    pub fn new(name: impl Into<String>, shader: Option<&str>) -> Self {
        Self {
            name: name.into(),
            shader: shader.map(str::to_string),
            is_meshlight: false,
        }
    }
}

/// One object in the scene file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    pub name: String,
    pub kind: ObjectKind,
    pub parent: Option<String>,
    pub material: Option<String>,
    pub material_slots: Vec<String>,
    pub keys: Vec<TransformKey>,
    pub deform_keys: Vec<DeformKey>,
    pub geometry: Geometry,
    pub primvars: BTreeMap<String, Vec<f32>>,
    pub visibility: Visibility,
    pub motion: MotionOverride,
    pub family: Option<String>,
    pub selected: bool,
    pub export_as_coordsys: bool,
    pub instancer: Option<InstancerDesc>,
    pub particles: Vec<ParticleDesc>,
    #[serde(default = "default_true")]
    pub show_particles: bool,
    pub light: Option<LightParams>,
    pub camera: Option<CameraParams>,
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ObjectKind::Empty,
            parent: None,
            material: None,
            material_slots: Vec::new(),
            keys: Vec::new(),
            deform_keys: Vec::new(),
            geometry: Geometry::default(),
            primvars: BTreeMap::new(),
            visibility: Visibility::default(),
            motion: MotionOverride::default(),
            family: None,
            selected: false,
            export_as_coordsys: false,
            instancer: None,
            particles: Vec::new(),
            show_particles: true,
            light: None,
            camera: None,
        }
    }
}

impl ObjectDesc {
    /// Create an object at the origin.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// Place the object with a single static key.
    pub fn translated(mut self, translate: Vec3) -> Self {
        self.keys = vec![TransformKey::at(0.0, translate)];
        self
    }

    /// Add a translation key.
    pub fn key(mut self, time: f32, translate: Vec3) -> Self {
        self.keys.push(TransformKey::at(time, translate));
        self
    }

    /// Add a deformation key.
    pub fn deform_key(mut self, time: f32, offset: Vec3) -> Self {
        self.deform_keys.push(DeformKey { time, offset });
        self
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parent = Some(name.into());
        self
    }

    pub fn material(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.material_slots.contains(&name) {
            self.material_slots.push(name.clone());
        }
        self.material = Some(name);
        self
    }

    pub fn points(mut self, points: Vec<Vec3>) -> Self {
        self.geometry.points = points;
        self
    }

    pub fn family(mut self, name: impl Into<String>) -> Self {
        self.family = Some(name.into());
        self
    }

    pub fn instancer(mut self, instancer: InstancerDesc) -> Self {
        self.instancer = Some(instancer);
        self
    }

    pub fn particles(mut self, particles: ParticleDesc) -> Self {
        self.particles.push(particles);
        self
    }

    /// Override the scene-wide motion segment counts.
    pub fn motion_segments(mut self, segments: u32, deform_segments: u32) -> Self {
        self.motion = MotionOverride {
            enabled: true,
            segments,
            deform_segments,
        };
        self
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    /// Whether any key differs from the first one.
    pub fn is_animated(&self) -> bool {
        self.keys.windows(2).any(|w| {
            w[0].translate != w[1].translate || w[0].rotate != w[1].rotate || w[0].scale != w[1].scale
        })
    }

    /// Whether the shape changes over time.
    pub fn is_deforming(&self) -> bool {
        self.deform_keys.windows(2).any(|w| w[0].offset != w[1].offset)
    }

    /// Local transform at `time` (keys must be sorted by time).
    pub fn local_matrix(&self, time: f32) -> Mat4 {
        match sample_segment(&self.keys, |k| k.time, time) {
            Sample::None => Mat4::IDENTITY,
            Sample::Exact(i) => self.keys[i].to_matrix(),
            Sample::Between(i, t) => self.keys[i].lerp(&self.keys[i + 1], t).to_matrix(),
        }
    }

    /// Point displacement at `time` (keys must be sorted by time).
    pub fn deform_offset(&self, time: f32) -> Vec3 {
        match sample_segment(&self.deform_keys, |k| k.time, time) {
            Sample::None => Vec3::ZERO,
            Sample::Exact(i) => self.deform_keys[i].offset,
            Sample::Between(i, t) => self.deform_keys[i].offset.lerp(self.deform_keys[i + 1].offset, t),
        }
    }
}

enum Sample {
    None,
    Exact(usize),
    Between(usize, f32),
}

/// Locate `time` within sorted keys, clamping outside the keyed range.
fn sample_segment<K>(keys: &[K], key_time: impl Fn(&K) -> f32, time: f32) -> Sample {
    let Some(last) = keys.len().checked_sub(1) else {
        return Sample::None;
    };
    if time <= key_time(&keys[0]) {
        return Sample::Exact(0);
    }
    if time >= key_time(&keys[last]) {
        return Sample::Exact(last);
    }
    for i in 0..last {
        let (t0, t1) = (key_time(&keys[i]), key_time(&keys[i + 1]));
        if time >= t0 && time <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return Sample::Exact(i + 1);
            }
            return Sample::Between(i, (time - t0) / span);
        }
    }
    Sample::Exact(last)
}
