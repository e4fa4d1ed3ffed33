//! In-memory keyframed source scene.
//!
//! [`Scene`] evaluates a [`SceneDescription`] at a cursor and exposes the
//! result through [`SourceScene`]. It is the reference host used by the CLI
//! and the exporter tests: transforms and deformations are linearly
//! interpolated, point instancers and particle systems expand into
//! instanced placements.
//!
//! # Example
//!
//! ```ignore
//! use relay_core::scene::{ObjectDesc, SceneDescription};
//! use relay_core::{ObjectKind, Scene};
//!
//! let desc = SceneDescription::new("shot")
//!     .with_object(ObjectDesc::new("Cube", ObjectKind::Mesh));
//! let scene = Scene::from_description(desc)?;
//! ```

mod desc;
mod loader;

pub use desc::*;
pub use loader::*;

use std::collections::HashMap;

use relay_math::{Cursor, Mat4, Vec3};

use crate::ids::{EntityId, MaterialId};
use crate::source::{
    ObjectKind, ParticleSettings, ParticleSystem, Placement, SourceEntity, SourceMaterial,
    SourceResult, SourceScene,
};

/// An evaluated scene.
#[derive(Clone, Debug)]
pub struct Scene {
    desc: SceneDescription,
    cursor: Cursor,
    entities: Vec<SourceEntity>,
    index: HashMap<EntityId, usize>,
    placements: Vec<Placement>,
    materials: Vec<SourceMaterial>,
    camera: Option<EntityId>,
    evaluations: usize,
}

impl Scene {
    /// Validate a description and evaluate it at its current frame.
    pub fn from_description(mut desc: SceneDescription) -> LoadResult<Self> {
        loader::validate(&desc)?;

        for object in &mut desc.objects {
            object.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
            object.deform_keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        let materials = desc
            .materials
            .iter()
            .map(|m| SourceMaterial {
                id: MaterialId::from_name(&m.name),
                name: m.name.clone(),
                shader: m.shader.clone(),
                is_meshlight: m.is_meshlight,
            })
            .collect();
        let camera = desc.camera.as_deref().map(EntityId::object);
        let cursor = Cursor::new(desc.frame, 0.0);

        let mut scene = Self {
            desc,
            cursor,
            entities: Vec::new(),
            index: HashMap::new(),
            placements: Vec::new(),
            materials,
            camera,
            evaluations: 0,
        };
        scene.evaluate();
        Ok(scene)
    }

    /// Scene name.
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// The description this scene was built from.
    pub fn description(&self) -> &SceneDescription {
        &self.desc
    }

    /// Raw export options block from the scene file.
    pub fn options(&self) -> Option<&serde_json::Value> {
        self.desc.options.as_ref()
    }

    /// Number of times the scene has been evaluated.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations
    }

    /// Re-evaluate every entity and placement at the current cursor.
    fn evaluate(&mut self) {
        let time = self.cursor.time();
        let objects = &self.desc.objects;
        let by_name: HashMap<&str, usize> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.name.as_str(), i))
            .collect();
        let parent_of = |i: usize| -> Option<usize> {
            objects[i].parent.as_deref().and_then(|p| by_name.get(p).copied())
        };

        // Validation guarantees acyclic parents, so walking up terminates.
        let mut world = Vec::with_capacity(objects.len());
        let mut transforming = Vec::with_capacity(objects.len());
        for i in 0..objects.len() {
            let mut matrix = objects[i].local_matrix(time);
            let mut animated = objects[i].is_animated();
            let mut cursor = parent_of(i);
            while let Some(p) = cursor {
                matrix = objects[p].local_matrix(time) * matrix;
                animated |= objects[p].is_animated();
                cursor = parent_of(p);
            }
            world.push(matrix);
            transforming.push(animated);
        }

        let mut entities = Vec::with_capacity(objects.len());
        let mut placements = Vec::new();

        for (i, object) in objects.iter().enumerate() {
            let id = EntityId::object(&object.name);
            let matrix_world = world[i];

            let particle_systems: Vec<ParticleSystem> = object
                .particles
                .iter()
                .map(|p| evaluate_particles(&object.name, p, matrix_world, time))
                .collect();

            let mut geometry = object.geometry.clone();
            let offset = object.deform_offset(time);
            if offset != Vec3::ZERO {
                for point in &mut geometry.points {
                    *point += offset;
                }
            }

            let is_instancer = object.instancer.is_some()
                || particle_systems.iter().any(|p| p.settings.is_instancer());

            // The object itself
            let mut direct = Placement::direct(id, matrix_world);
            direct.show_self = object.visibility.render
                && object.instancer.as_ref().map_or(true, |inst| inst.show_instancer);
            direct.show_particles = object.show_particles;
            direct.visible_in_viewport = object.visibility.viewport;
            placements.push(direct);

            // Point instancer placements
            if let Some(instancer) = &object.instancer {
                for j in 0..instancer.positions.len() {
                    let Some(proto) = instancer.prototype_for(j) else {
                        continue;
                    };
                    placements.push(Placement {
                        entity: EntityId::object(proto),
                        is_instance: true,
                        parent: Some(id),
                        particle_system: None,
                        persistent_id: vec![j as u32],
                        matrix_world: matrix_world * instancer.instance_matrix(j),
                        show_self: true,
                        show_particles: true,
                        visible_in_viewport: object.visibility.viewport,
                    });
                }
            }

            // Particle instancer placements
            for (k, psys) in particle_systems.iter().enumerate() {
                let Some(instanced) = psys.settings.instance_object else {
                    continue;
                };
                for (n, point) in psys.points.iter().enumerate() {
                    placements.push(Placement {
                        entity: instanced,
                        is_instance: true,
                        parent: Some(id),
                        particle_system: Some(psys.id),
                        persistent_id: vec![k as u32, n as u32],
                        matrix_world: Mat4::from_translation(*point),
                        show_self: true,
                        show_particles: true,
                        visible_in_viewport: object.visibility.viewport,
                    });
                }
            }

            entities.push(SourceEntity {
                id,
                name: object.name.clone(),
                kind: object.kind.clone(),
                parent: object.parent.as_deref().map(EntityId::object),
                material: object.material.as_deref().map(MaterialId::from_name),
                material_slots: object.material_slots.iter().map(|m| MaterialId::from_name(m)).collect(),
                particle_systems,
                visibility: object.visibility.clone(),
                motion: object.motion.clone(),
                is_transforming: transforming[i],
                is_deforming: object.is_deforming(),
                is_instancer,
                family: object.family.clone(),
                selected: object.selected,
                export_as_coordsys: object.export_as_coordsys,
                matrix_world,
                geometry,
                primvars: object.primvars.clone(),
                light: light_params(object),
                camera: camera_params(object),
            });
        }

        self.index = entities.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
        self.entities = entities;
        self.placements = placements;
        self.evaluations += 1;
    }
}

fn light_params(object: &ObjectDesc) -> Option<crate::source::LightParams> {
    match object.kind {
        ObjectKind::Light { .. } => Some(object.light.clone().unwrap_or_default()),
        _ => object.light.clone(),
    }
}

fn camera_params(object: &ObjectDesc) -> Option<crate::source::CameraParams> {
    match object.kind {
        ObjectKind::Camera => Some(object.camera.clone().unwrap_or_default()),
        _ => object.camera.clone(),
    }
}

fn evaluate_particles(owner: &str, desc: &ParticleDesc, emitter: Mat4, time: f32) -> ParticleSystem {
    let id = EntityId::particle_system(owner, &desc.name);
    let points = (0..desc.count)
        .map(|i| {
            let origin = emitter.transform_point3(Vec3::new(i as f32 * desc.spacing, 0.0, 0.0));
            origin + desc.velocity * time
        })
        .collect::<Vec<_>>();
    let widths = vec![0.1; points.len()];

    ParticleSystem {
        id,
        name: desc.name.clone(),
        settings: ParticleSettings {
            id: EntityId::from_path("PSETTINGS", &format!("{owner}/{}", desc.name)),
            name: desc.name.clone(),
            instance_object: desc.instance_object.as_deref().map(EntityId::object),
            override_instance_material: desc.override_instance_material,
            material_index: desc.material_index,
        },
        points,
        widths,
    }
}

impl SourceScene for Scene {
    fn cursor(&self) -> Cursor {
        self.cursor
    }

    fn set_cursor(&mut self, cursor: Cursor) -> SourceResult<()> {
        self.cursor = cursor;
        self.evaluate();
        Ok(())
    }

    fn entities(&self) -> &[SourceEntity] {
        &self.entities
    }

    fn placements(&self) -> &[Placement] {
        &self.placements
    }

    fn materials(&self) -> &[SourceMaterial] {
        &self.materials
    }

    fn active_camera(&self) -> Option<EntityId> {
        self.camera
    }

    fn entity(&self, id: EntityId) -> Option<&SourceEntity> {
        self.index.get(&id).map(|&i| &self.entities[i])
    }
}
