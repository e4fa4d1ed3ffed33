//! Motion-blur sampling.
//!
//! The sampler walks the scene-wide step set in ascending order, moving the
//! source scene to each offset in turn:
//!
//! - the first step resolves every placement through the
//!   [`InstanceResolver`], creating groups and writing sample 0
//! - later steps revisit only moving entities and particle-driven
//!   placements, writing the sample whose time matches the step
//! - deformation samples and the main camera are written at every step
//!
//! The source cursor is held by a [`CursorGuard`] for the whole sweep and
//! goes back to the original frame (subframe 0) on every exit path.

use std::ops::{Deref, DerefMut};

use relay_core::{GraphResult, ProgressSink, SceneGraph, SourceError, SourceScene};
use relay_math::{normalize_steps, Cursor};

use crate::instance::{InstanceResolver, Resolution};
use crate::records::PlacementKey;
use crate::state::PassState;
use crate::translator::TranslatorRegistry;

/// Scoped hold on the source scene cursor.
///
/// Dropping the guard moves the scene back to the frame it was on when the
/// guard was taken, at subframe 0.
pub struct CursorGuard<'a, S: SourceScene + ?Sized> {
    scene: &'a mut S,
    restore: Cursor,
}

impl<'a, S: SourceScene + ?Sized> CursorGuard<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        let restore = Cursor::new(scene.cursor().frame, 0.0);
        Self { scene, restore }
    }

    /// Cursor restored on drop.
    pub fn restore_to(&self) -> Cursor {
        self.restore
    }
}

impl<S: SourceScene + ?Sized> Deref for CursorGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.scene
    }
}

impl<S: SourceScene + ?Sized> DerefMut for CursorGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.scene
    }
}

impl<S: SourceScene + ?Sized> Drop for CursorGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.scene.set_cursor(self.restore) {
            log::error!("Failed to restore scene cursor: {}", err);
        }
    }
}

/// Sweep progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Pending,
    Sampling(usize),
    Done,
}

/// What a sweep managed to write.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    /// Offsets swept, ascending
    pub steps: Vec<f32>,
    /// Steps fully written
    pub sampled: usize,
    /// Error that stopped the sweep early
    pub error: Option<SourceError>,
}

impl SweepReport {
    /// Whether every step was written.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.sampled == self.steps.len()
    }
}

/// Fills transform and deformation samples across the shutter.
pub struct MotionSampler<'a> {
    registry: &'a TranslatorRegistry,
    resolver: InstanceResolver<'a>,
    progress: &'a dyn ProgressSink,
}

impl<'a> MotionSampler<'a> {
    pub fn new(registry: &'a TranslatorRegistry, interactive: bool, progress: &'a dyn ProgressSink) -> Self {
        Self {
            registry,
            resolver: InstanceResolver::new(registry, interactive),
            progress,
        }
    }

    /// Sample every step in `state.motion_steps`.
    ///
    /// A failing re-evaluation stops the sweep and is reported, not
    /// returned; graph errors abort it. The cursor is restored either way.
    pub fn sweep<S: SourceScene + ?Sized>(
        &self,
        scene: &mut S,
        graph: &mut dyn SceneGraph,
        state: &mut PassState,
    ) -> GraphResult<SweepReport> {
        let steps = state.sorted_steps();
        let labels = normalize_steps(&steps);
        let origin = scene.cursor().frame;
        let mut report = SweepReport {
            steps: steps.clone(),
            sampled: 0,
            error: None,
        };

        let mut guard = CursorGuard::new(scene);
        let mut sweep = SweepState::Pending;
        loop {
            sweep = match sweep {
                SweepState::Pending if steps.is_empty() => SweepState::Done,
                SweepState::Pending => SweepState::Sampling(0),
                SweepState::Sampling(i) if i >= steps.len() => SweepState::Done,
                SweepState::Sampling(i) => {
                    let cursor = Cursor::at_offset(origin, steps[i]);
                    if let Err(err) = guard.set_cursor(cursor) {
                        log::warn!("Motion blur sweep stopped at offset {}: {}", steps[i], err);
                        report.error = Some(err);
                        SweepState::Done
                    } else {
                        self.progress.set_export_stats(
                            &format!("Motion sample {}/{} (time {:.3})", i + 1, steps.len(), labels[i]),
                            i as f32 / steps.len() as f32,
                        );
                        self.sample_step(&*guard, graph, state, i, steps[i])?;
                        report.sampled += 1;
                        SweepState::Sampling(i + 1)
                    }
                }
                SweepState::Done => break,
            };
        }

        log::debug!(
            "Motion sweep wrote {}/{} steps, restoring frame {}",
            report.sampled,
            steps.len(),
            guard.restore_to().frame
        );
        Ok(report)
    }

    /// Write everything that samples at `step`.
    fn sample_step<S: SourceScene + ?Sized>(
        &self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        state: &mut PassState,
        index: usize,
        step: f32,
    ) -> GraphResult<()> {
        if index == 0 {
            for placement in scene.placements() {
                let resolution = self.resolver.resolve(scene, graph, state, placement)?;
                if let Resolution::Skipped(reason) = resolution {
                    log::debug!("Skipped placement of {}: {:?}", placement.entity, reason);
                    state.skipped_placements += 1;
                }
            }
        } else {
            self.sample_transforms(scene, graph, state, step)?;
        }
        self.sample_deformation(scene, graph, state, step)?;
        self.sample_camera(scene, graph, state, step)
    }

    fn sample_transforms<S: SourceScene + ?Sized>(
        &self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        state: &PassState,
        step: f32,
    ) -> GraphResult<()> {
        let groups = self.registry.group();
        for placement in scene.placements() {
            if !state.moving.contains(&placement.entity) && placement.particle_system.is_none() {
                continue;
            }
            let Some(record) = state.entities.get(&placement.entity) else {
                continue;
            };
            let key = PlacementKey::for_placement(placement);
            let Some(group) = record.instances.get(&key) else {
                log::debug!("Placement {} first seen at offset {}, not sampled", key, step);
                continue;
            };
            // Sample 0 belongs to the first step
            match group.sample_index(step) {
                Some(i) if i > 0 => groups.update_transform_sample(graph, group.node, i, placement.matrix_world)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn sample_deformation<S: SourceScene + ?Sized>(
        &self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        state: &PassState,
        step: f32,
    ) -> GraphResult<()> {
        for id in &state.moving {
            // Deformation samples are reserved by `update`
            if !state.processed.contains(id) {
                continue;
            }
            let Some(record) = state.entities.get(id).filter(|r| r.is_deforming) else {
                continue;
            };
            let Some(index) = record.deform_index(step) else {
                continue;
            };
            let Some(entity) = scene.entity(*id) else {
                continue;
            };
            if let Some(translator) = self.registry.translator_for(record.category) {
                translator.export_deform_sample(graph, record, entity, index)?;
            }
        }

        for record in state.particles.values().filter(|r| r.is_deforming) {
            let Some(index) = record.deform_index(step) else {
                continue;
            };
            let psys = record
                .parent
                .and_then(|owner| scene.entity(owner))
                .and_then(|owner| owner.particle_systems.iter().find(|p| p.id == record.id));
            if let Some(psys) = psys {
                self.registry.particles().export_system_sample(graph, record, psys, index)?;
            }
        }
        Ok(())
    }

    fn sample_camera<S: SourceScene + ?Sized>(
        &self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        state: &PassState,
        step: f32,
    ) -> GraphResult<()> {
        let Some(camera) = state.main_camera.and_then(|id| state.cameras.get(&id)) else {
            return Ok(());
        };
        if !camera.is_transforming {
            return Ok(());
        }
        let (Some(index), Some(entity)) = (camera.transform_index(step), scene.entity(camera.id)) else {
            return Ok(());
        };
        self.registry
            .group()
            .update_transform_sample(graph, camera.node, index, entity.matrix_world)
    }
}
