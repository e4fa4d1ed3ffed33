//! Export orchestration.
//!
//! An [`Exporter`] runs one pass as a fixed sequence of phases:
//!
//! ```text
//! RESET -> ROOT -> MATERIALS -> DATA_BLOCKS -> GLOBAL_SETTINGS -> CAMERAS
//!       -> INSTANCES [-> MOTION_SAMPLES] -> STATS
//! ```
//!
//! Every pass starts from `RESET`, which empties the pass tables and the
//! target graph, so running the same pass twice gives the same graph.
//! Modes share the translation phases and differ in settings and cameras.
//! Light solo and mute flags are applied once instances are placed.
//!
//! # Example
//!
//! ```ignore
//! use relay_core::{load_scene, MemoryGraph};
//! use relay_export::{ExportMode, ExportOptions, Exporter};
//!
//! let mut scene = load_scene("shot.json")?;
//! let mut graph = MemoryGraph::new();
//! let mut exporter = Exporter::new(ExportOptions::default().with_motion_blur(3, 2))
//!     .with_mode(ExportMode::Final);
//! let summary = exporter.export(&mut scene, &mut graph)?;
//! println!("{} groups", summary.groups);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_core::{
    AttrValue, EntityId, GraphError, GraphResult, Hidden, LogProgress, MaterialId, NodeKind,
    ObjectKind, Placement, ProgressSink, SceneGraph, SourceEntity, SourceScene,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;
use crate::instance::{InstanceResolver, Resolution};
use crate::motion::{MotionSampler, SweepReport};
use crate::options::ExportOptions;
use crate::records::{EntityRecord, PlacementKey};
use crate::state::PassState;
use crate::translator::{Translator, TranslatorRegistry};

/// Steps of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Reset,
    Root,
    Materials,
    DataBlocks,
    GlobalSettings,
    Cameras,
    Instances,
    MotionSamples,
    Stats,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Reset => "RESET",
            Phase::Root => "ROOT",
            Phase::Materials => "MATERIALS",
            Phase::DataBlocks => "DATA_BLOCKS",
            Phase::GlobalSettings => "GLOBAL_SETTINGS",
            Phase::Cameras => "CAMERAS",
            Phase::Instances => "INSTANCES",
            Phase::MotionSamples => "MOTION_SAMPLES",
            Phase::Stats => "STATS",
        }
    }

    /// Progress label.
    fn label(self) -> &'static str {
        match self {
            Phase::Reset => "Resetting",
            Phase::Root => "Exporting root",
            Phase::Materials => "Exporting materials",
            Phase::DataBlocks => "Exporting data blocks",
            Phase::GlobalSettings => "Exporting global settings",
            Phase::Cameras => "Exporting cameras",
            Phase::Instances => "Exporting instances",
            Phase::MotionSamples => "Exporting motion samples",
            Phase::Stats => "Finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const FULL_PASS: &[Phase] = &[
    Phase::Reset,
    Phase::Root,
    Phase::Materials,
    Phase::DataBlocks,
    Phase::GlobalSettings,
    Phase::Cameras,
    Phase::Instances,
    Phase::Stats,
];

const CAMERALESS_PASS: &[Phase] = &[
    Phase::Reset,
    Phase::Root,
    Phase::Materials,
    Phase::DataBlocks,
    Phase::GlobalSettings,
    Phase::Instances,
    Phase::Stats,
];

const SELECTION_PASS: &[Phase] = &[
    Phase::Reset,
    Phase::Root,
    Phase::Materials,
    Phase::DataBlocks,
    Phase::Instances,
    Phase::Stats,
];

/// Kind of pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Final frame render
    #[default]
    Final,
    /// Live viewport session; uses viewport visibility, no motion blur
    Interactive,
    /// Texture bake; no cameras
    Bake,
    /// Selected objects only; no settings, cameras or blur
    Selection,
    /// Material preview; the caller supplies camera and lights
    Swatch,
}

impl ExportMode {
    /// Phases run by this mode, in order.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            ExportMode::Final | ExportMode::Interactive => FULL_PASS,
            ExportMode::Bake | ExportMode::Swatch => CAMERALESS_PASS,
            ExportMode::Selection => SELECTION_PASS,
        }
    }

    pub fn allows_motion_blur(self) -> bool {
        self == ExportMode::Final
    }

    pub fn name(self) -> &'static str {
        match self {
            ExportMode::Final => "final",
            ExportMode::Interactive => "interactive",
            ExportMode::Bake => "bake",
            ExportMode::Selection => "selection",
            ExportMode::Swatch => "swatch",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "final" => Ok(ExportMode::Final),
            "interactive" => Ok(ExportMode::Interactive),
            "bake" => Ok(ExportMode::Bake),
            "selection" => Ok(ExportMode::Selection),
            "swatch" => Ok(ExportMode::Swatch),
            other => Err(format!(
                "unknown export mode '{other}' (expected final, interactive, bake, selection or swatch)"
            )),
        }
    }
}

/// Pass-level failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("export failed in {phase}: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: GraphError,
    },

    #[error("export cancelled before {phase}")]
    Cancelled { phase: Phase },
}

impl ExportError {
    /// Phase the pass stopped in.
    pub fn phase(&self) -> Phase {
        match self {
            ExportError::Phase { phase, .. } | ExportError::Cancelled { phase } => *phase,
        }
    }
}

/// Result type for export passes.
pub type ExportResult<T> = Result<T, ExportError>;

fn in_phase(phase: Phase) -> impl FnOnce(GraphError) -> ExportError {
    move |source| ExportError::Phase { phase, source }
}

/// Shared flag to stop a pass between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Counts reported by the STATS phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub mode: ExportMode,
    pub entities: usize,
    pub particle_systems: usize,
    pub materials: usize,
    pub cameras: usize,
    /// Group records for renderable placements
    pub groups: usize,
    pub skipped_placements: usize,
    /// Offsets sampled for motion blur
    pub motion_steps: Vec<f32>,
    /// False when a motion sweep stopped early
    pub motion_complete: bool,
}

/// Runs export passes and owns the pass tables between them.
pub struct Exporter {
    registry: TranslatorRegistry,
    options: ExportOptions,
    mode: ExportMode,
    state: PassState,
    cancel: CancelToken,
    progress: Box<dyn ProgressSink>,
    sweep: Option<SweepReport>,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            registry: TranslatorRegistry::with_defaults(),
            options,
            mode: ExportMode::Final,
            state: PassState::new(),
            cancel: CancelToken::new(),
            progress: Box::new(LogProgress),
            sweep: None,
        }
    }

    pub fn with_mode(mut self, mode: ExportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_registry(mut self, registry: TranslatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels the running pass at the next phase boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn state(&self) -> &PassState {
        &self.state
    }

    pub fn registry(&self) -> &TranslatorRegistry {
        &self.registry
    }

    /// Report of the last motion sweep, if one ran.
    pub fn last_sweep(&self) -> Option<&SweepReport> {
        self.sweep.as_ref()
    }

    fn interactive(&self) -> bool {
        self.mode == ExportMode::Interactive
    }

    fn motion_blur(&self) -> bool {
        self.options.samples_motion() && self.mode.allows_motion_blur()
    }

    /// Run a full pass into `graph`.
    pub fn export<S: SourceScene + ?Sized>(
        &mut self,
        scene: &mut S,
        graph: &mut dyn SceneGraph,
    ) -> ExportResult<ExportSummary> {
        log::info!("Starting {} export at frame {}", self.mode, scene.cursor().frame);
        if self.options.motion_blur && !self.options.shutter.is_open() {
            log::warn!(
                "Shutter angle {} never opens, exporting without motion blur",
                self.options.shutter.angle
            );
        }

        for &phase in self.mode.phases() {
            if phase != Phase::Reset && self.cancel.is_cancelled() {
                log::info!("Export cancelled before {}", phase);
                return Err(ExportError::Cancelled { phase });
            }
            self.progress.set_export_stats(phase.label(), 0.0);
            self.run_phase(phase, scene, graph)?;
        }

        let summary = self.summary();
        log::info!(
            "Exported {} entities, {} groups, {} materials ({} placements skipped)",
            summary.entities,
            summary.groups,
            summary.materials,
            summary.skipped_placements
        );
        Ok(summary)
    }

    fn run_phase<S: SourceScene + ?Sized>(
        &mut self,
        phase: Phase,
        scene: &mut S,
        graph: &mut dyn SceneGraph,
    ) -> ExportResult<()> {
        let result = match phase {
            Phase::Reset => self.reset(graph),
            Phase::Root => self.export_root(graph),
            Phase::Materials => self.export_materials(&*scene, graph),
            Phase::DataBlocks => self.export_data_blocks(&*scene, graph),
            Phase::GlobalSettings => self.export_global_settings(&*scene, graph),
            Phase::Cameras => self.export_cameras(&*scene, graph),
            Phase::Instances | Phase::MotionSamples => {
                if self.motion_blur() && !self.state.motion_steps.is_empty() {
                    self.export_instances_motion(scene, graph)
                        .map_err(in_phase(Phase::MotionSamples))?;
                } else {
                    self.export_instances(&*scene, graph).map_err(in_phase(phase))?;
                }
                self.check_solo_light(&*scene, graph)
            }
            Phase::Stats => {
                self.progress.set_export_stats(phase.label(), 1.0);
                Ok(())
            }
        };
        result.map_err(in_phase(phase))
    }

    fn reset(&mut self, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        self.state.clear();
        self.sweep = None;
        self.cancel.reset();
        graph.reset()
    }

    fn export_root(&mut self, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let root = graph.root();
        for (name, value) in &self.options.root_attributes {
            graph.set_attribute(root, name, value.clone())?;
        }
        Ok(())
    }

    fn export_materials<S: SourceScene + ?Sized>(&mut self, scene: &S, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let total = scene.materials().len();
        for (i, material) in scene.materials().iter().enumerate() {
            let record = self.registry.material().export(graph, material)?;
            self.state.materials.insert(material.id, record);
            self.progress
                .set_export_stats(Phase::Materials.label(), (i + 1) as f32 / total as f32);
        }
        Ok(())
    }

    fn export_data_blocks<S: SourceScene + ?Sized>(&mut self, scene: &S, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let total = scene.entities().len();
        for (i, entity) in scene.entities().iter().enumerate() {
            if self.mode == ExportMode::Selection && !entity.selected {
                continue;
            }
            self.export_data_block(entity, graph)?;
            self.progress
                .set_export_stats(Phase::DataBlocks.label(), (i + 1) as f32 / total as f32);
        }
        Ok(())
    }

    /// Translate one entity and its particle systems, once per pass.
    fn export_data_block(&mut self, entity: &SourceEntity, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let category = match Category::detect(entity) {
            Ok(category) => category,
            Err(err) => {
                log::debug!("Skipping data block: {}", err);
                return Ok(());
            }
        };
        if category.is_auxiliary() || self.state.entities.contains_key(&entity.id) {
            return Ok(());
        }
        let Some(translator) = self.registry.translator_for(category) else {
            log::debug!("No translator for {:?} '{}'", category, entity.name);
            return Ok(());
        };
        let Some(mut record) = translator.export(graph, entity, &entity.name)? else {
            log::debug!("Translator declined '{}'", entity.name);
            return Ok(());
        };
        // Instances of an empty hang under its own node
        let instancer_hidden =
            (self.interactive() && !entity.visibility.instancer_viewport) || !entity.visibility.instancer_render;
        if instancer_hidden && category != Category::Empty {
            graph.set_hidden(record.node, Hidden::Hide)?;
        }

        if self.motion_blur() {
            let (segments, deform_segments) = self.options.segments_for(entity);
            if entity.is_transforming {
                record.motion_steps = self.options.steps_for(segments);
                record.is_transforming = !record.motion_steps.is_empty();
            }
            if entity.is_deforming && category.is_geometry() {
                record.deform_motion_steps = self.options.steps_for(deform_segments);
                record.is_deforming = !record.deform_motion_steps.is_empty();
            }
            if record.is_moving() {
                self.state.moving.insert(entity.id);
                self.state.add_motion_steps(&record.motion_steps);
                self.state.add_motion_steps(&record.deform_motion_steps);
            }
        }

        for psys in &entity.particle_systems {
            if psys.settings.is_instancer() {
                if self.motion_blur() && self.state.particle_motion_steps.is_empty() {
                    let steps = self.options.steps_for(self.options.motion_segments);
                    self.state.add_motion_steps(&steps);
                    self.state.particle_motion_steps = steps;
                }
                continue;
            }

            let particle_group = match record.particle_group {
                Some(node) => node,
                None => {
                    let node = self
                        .registry
                        .group()
                        .export(graph, &format!("{}|particles", record.db_name))?;
                    graph.set_inherit_transform(node, false)?;
                    record.particle_group = Some(node);
                    node
                }
            };

            let particles = self.registry.particles();
            let mut psys_record = particles.export_system(graph, &record, psys)?;
            if self.motion_blur() {
                psys_record.deform_motion_steps = self.options.steps_for(2);
                psys_record.is_deforming = !psys_record.deform_motion_steps.is_empty();
                self.state.add_motion_steps(&psys_record.deform_motion_steps);
            }
            particles.update_system(graph, psys, &mut psys_record)?;
            graph.add_child(particle_group, psys_record.node)?;
            record.particle_systems.push(psys.id);
            self.state.particles.insert(psys.id, psys_record);
        }

        self.state.entities.insert(entity.id, record);
        Ok(())
    }

    fn export_global_settings<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
    ) -> GraphResult<()> {
        graph.set_option("Ri:Frame", scene.cursor().frame.into())?;
        graph.set_option("relay:mode", self.mode.name().into())?;
        if self.motion_blur() {
            let shutter = self.options.shutter;
            graph.set_option("Ri:Shutter", AttrValue::Floats(vec![shutter.start(), shutter.end()]))?;
        }
        match self.mode {
            ExportMode::Interactive => graph.set_option("relay:interactive", 1_i32.into()),
            ExportMode::Bake => graph.set_option("bake:enabled", 1_i32.into()),
            ExportMode::Swatch => graph.set_option("swatch:enabled", 1_i32.into()),
            ExportMode::Final | ExportMode::Selection => Ok(()),
        }
    }

    /// Main camera, other cameras as coordinate systems, then the default
    /// light.
    fn export_cameras<S: SourceScene + ?Sized>(&mut self, scene: &S, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let active = scene.active_camera();
        if active.is_none() {
            log::debug!("Scene has no active camera");
        }

        let cameras = self.registry.camera();
        let root = graph.root();
        for entity in scene.entities().iter().filter(|e| e.kind == ObjectKind::Camera) {
            let Some(mut record) = cameras.export(graph, entity, &entity.name)? else {
                continue;
            };
            cameras.update(graph, entity, &mut record)?;
            graph.add_child(root, record.node)?;

            if Some(entity.id) != active {
                cameras.export_coordinate_system(graph, entity, &record)?;
                self.state.cameras.insert(entity.id, record);
                continue;
            }

            if self.motion_blur() && entity.is_transforming {
                let (segments, _) = self.options.segments_for(entity);
                record.motion_steps = self.options.steps_for(segments);
                record.is_transforming = !record.motion_steps.is_empty();
                self.state.add_motion_steps(&record.motion_steps);
            }
            if record.is_transforming {
                graph.set_transform_num_samples(record.node, &record.motion_steps)?;
            } else {
                graph.set_transform(record.node, entity.matrix_world)?;
            }
            self.state.main_camera = Some(entity.id);
            self.state.cameras.insert(entity.id, record);
        }

        self.export_default_light(scene, graph)
    }

    /// Headlight, hidden unless asked for and the scene has no lights.
    fn export_default_light<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
    ) -> GraphResult<()> {
        let node = graph.create_node(NodeKind::Light, "default_light")?;
        graph.set_attribute(node, "shader", "PxrDistantLight".into())?;
        graph.set_attribute(node, "intensity", 1.0_f32.into())?;
        let root = graph.root();
        graph.add_child(root, node)?;

        let has_lights = scene
            .entities()
            .iter()
            .any(|e| matches!(e.kind, ObjectKind::Light { filter: false }));
        let visible = self.options.render_default_light && !has_lights;
        graph.set_hidden(node, if visible { Hidden::Show } else { Hidden::Hide })?;
        self.state.default_light = Some(node);
        Ok(())
    }

    /// Show only soloed lights while soloing, else hide muted ones.
    ///
    /// Interactive passes also hide lights hidden in the viewport or left
    /// out of local view.
    fn check_solo_light<S: SourceScene + ?Sized>(&self, scene: &S, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let lights = scene
            .entities()
            .iter()
            .filter(|e| matches!(e.kind, ObjectKind::Light { filter: false }));
        for entity in lights {
            let Some(record) = self.state.entities.get(&entity.id) else {
                continue;
            };
            let (solo, mute) = entity.light.as_ref().map_or((false, false), |l| (l.solo, l.mute));
            let hidden = if self.options.solo_light {
                !solo
            } else if self.interactive() {
                mute || !entity.visibility.viewport || !in_local_view(scene, entity.id)
            } else {
                mute
            };
            graph.set_hidden(record.node, if hidden { Hidden::Hide } else { Hidden::Show })?;
        }
        Ok(())
    }

    fn export_instances<S: SourceScene + ?Sized>(&mut self, scene: &S, graph: &mut dyn SceneGraph) -> GraphResult<()> {
        let resolver = InstanceResolver::new(&self.registry, self.mode == ExportMode::Interactive);
        let total = scene.placements().len();
        for (i, placement) in scene.placements().iter().enumerate() {
            if let Resolution::Skipped(reason) = resolver.resolve(scene, graph, &mut self.state, placement)? {
                log::debug!("Skipped placement of {}: {:?}", placement.entity, reason);
                self.state.skipped_placements += 1;
            }
            self.progress
                .set_export_stats(Phase::Instances.label(), (i + 1) as f32 / total as f32);
        }
        Ok(())
    }

    fn export_instances_motion<S: SourceScene + ?Sized>(
        &mut self,
        scene: &mut S,
        graph: &mut dyn SceneGraph,
    ) -> GraphResult<()> {
        let report = {
            let sampler = MotionSampler::new(&self.registry, self.interactive(), self.progress.as_ref());
            sampler.sweep(scene, graph, &mut self.state)?
        };

        if report.sampled == 0 {
            log::warn!("No motion samples written, placing instances at frame {}", scene.cursor().frame);
            self.export_instances(&*scene, graph)?;
            self.place_camera_first_sample(&*scene, graph)?;
        }
        self.sweep = Some(report);
        Ok(())
    }

    fn place_camera_first_sample<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
    ) -> GraphResult<()> {
        let Some(camera) = self.state.main_camera.and_then(|id| self.state.cameras.get(&id)) else {
            return Ok(());
        };
        match scene.entity(camera.id) {
            Some(entity) if camera.is_transforming => graph.set_transform_sample(camera.node, 0, entity.matrix_world),
            _ => Ok(()),
        }
    }

    fn summary(&self) -> ExportSummary {
        let (motion_steps, motion_complete) = match &self.sweep {
            Some(report) => (report.steps.clone(), report.is_complete()),
            None => (Vec::new(), true),
        };
        ExportSummary {
            mode: self.mode,
            entities: self.state.entities.len(),
            particle_systems: self.state.particles.len(),
            materials: self.state.materials.len(),
            cameras: self.state.cameras.len(),
            groups: self.state.num_object_instances,
            skipped_placements: self.state.skipped_placements,
            motion_steps,
            motion_complete,
        }
    }

    /// Translate a single entity outside a full pass.
    ///
    /// Returns whether the entity has a record afterwards.
    pub fn export_entity(&mut self, entity: &SourceEntity, graph: &mut dyn SceneGraph) -> ExportResult<bool> {
        self.export_data_block(entity, graph).map_err(in_phase(Phase::DataBlocks))?;
        Ok(self.state.entities.contains_key(&entity.id))
    }

    /// Resolve a single placement outside a full pass.
    pub fn export_placement<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        placement: &Placement,
    ) -> ExportResult<Resolution> {
        let resolver = InstanceResolver::new(&self.registry, self.mode == ExportMode::Interactive);
        resolver
            .resolve(scene, graph, &mut self.state, placement)
            .map_err(in_phase(Phase::Instances))
    }

    /// Refresh an already exported entity after an edit.
    ///
    /// Re-runs `update` and primvars, rewrites static placement transforms
    /// and resolves placements that did not exist before. Returns `false`
    /// when the entity was never exported.
    pub fn update_entity<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        id: EntityId,
    ) -> ExportResult<bool> {
        let phase = in_phase(Phase::DataBlocks);
        let Some(entity) = scene.entity(id) else {
            return Ok(false);
        };
        let Some(record) = self.state.entities.get_mut(&id) else {
            return Ok(false);
        };
        let Some(translator) = self.registry.translator_for(record.category) else {
            return Ok(false);
        };

        refresh_entity(translator, scene, graph, entity, record).map_err(phase)?;
        self.state.processed.insert(id);

        let resolver = InstanceResolver::new(&self.registry, self.mode == ExportMode::Interactive);
        for placement in scene.placements().iter().filter(|p| p.entity == id) {
            resolver
                .resolve(scene, graph, &mut self.state, placement)
                .map_err(in_phase(Phase::Instances))?;
        }
        Ok(true)
    }

    /// Rewrite a material's shader on its shared node.
    ///
    /// Groups bound to the material see the change without being revisited.
    /// Returns `false` when the material was never exported.
    pub fn update_material<S: SourceScene + ?Sized>(
        &mut self,
        scene: &S,
        graph: &mut dyn SceneGraph,
        id: MaterialId,
    ) -> ExportResult<bool> {
        let Some(material) = scene.material(id) else {
            return Ok(false);
        };
        let Some(record) = self.state.materials.get_mut(&id) else {
            return Ok(false);
        };
        let created = self
            .registry
            .material()
            .update(graph, material, record)
            .map_err(in_phase(Phase::Materials))?;

        // A material that had no node had nothing bound to it
        if let (true, Some(node)) = (created, record.node) {
            for group in self.state.entities.values().flat_map(|r| r.instances.values()) {
                if group.material == Some(id) {
                    graph.bind_material(group.node, node).map_err(in_phase(Phase::Materials))?;
                }
            }
        }
        Ok(true)
    }
}

fn in_local_view<S: SourceScene + ?Sized>(scene: &S, id: EntityId) -> bool {
    scene
        .placements()
        .iter()
        .filter(|p| p.entity == id && !p.is_instance)
        .all(|p| p.visible_in_viewport)
}

/// Re-run `update` and primvars, then rewrite static placement transforms.
fn refresh_entity<S: SourceScene + ?Sized>(
    translator: &dyn Translator,
    scene: &S,
    graph: &mut dyn SceneGraph,
    entity: &SourceEntity,
    record: &mut EntityRecord,
) -> GraphResult<()> {
    translator.update(graph, entity, record)?;
    translator.export_primvars(graph, entity, record)?;
    if record.category == Category::Meta {
        return Ok(());
    }
    for placement in scene.placements().iter().filter(|p| p.entity == entity.id) {
        let key = PlacementKey::for_placement(placement);
        match record.instances.get(&key) {
            Some(group) if !group.is_moving() => graph.set_transform(group.node, placement.matrix_world)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::scene::{InstancerDesc, MaterialDesc, ObjectDesc};
    use relay_core::{LightParams, MemoryGraph, Scene, SceneDescription};
    use relay_math::Vec3;

    fn shot() -> Scene {
        let desc = SceneDescription::new("shot")
            .with_frame(10)
            .with_material(MaterialDesc::new("Grey", Some("PxrSurface")))
            .with_object(ObjectDesc::new("Cam", ObjectKind::Camera).translated(Vec3::new(0.0, 0.0, 10.0)))
            .with_object(ObjectDesc::new("Witness", ObjectKind::Camera))
            .with_object(ObjectDesc::new("Cube", ObjectKind::Mesh).material("Grey"))
            .with_object(ObjectDesc::new("Gizmo", ObjectKind::Other("gizmo".into())))
            .with_camera("Cam");
        Scene::from_description(desc).unwrap()
    }

    #[test]
    fn test_final_pass() {
        let mut scene = shot();
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default());

        let summary = exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(summary.entities, 1);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.materials, 1);
        assert_eq!(summary.cameras, 2);
        assert!(summary.motion_steps.is_empty());
        assert!(summary.motion_complete);

        assert_eq!(exporter.state().main_camera, Some(EntityId::object("Cam")));
        assert_eq!(graph.coordinate_systems().len(), 1);
        assert_eq!(graph.option("Ri:Frame"), Some(&AttrValue::Int(10)));
    }

    #[test]
    fn test_swatch_skips_cameras() {
        let mut scene = shot();
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default()).with_mode(ExportMode::Swatch);

        let summary = exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(summary.cameras, 0);
        assert_eq!(graph.count_kind(NodeKind::Camera), 0);
        assert_eq!(graph.option("swatch:enabled"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn test_default_light_visibility() {
        let mut scene = shot();
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default().with_default_light(true));
        exporter.export(&mut scene, &mut graph).unwrap();

        let light = exporter.state().default_light.unwrap();
        assert_eq!(graph.node(light).unwrap().hidden, Hidden::Show);

        let mut exporter = Exporter::new(ExportOptions::default());
        exporter.export(&mut scene, &mut graph).unwrap();
        let light = exporter.state().default_light.unwrap();
        assert_eq!(graph.node(light).unwrap().hidden, Hidden::Hide);
    }

    #[test]
    fn test_selection_exports_selected_only() {
        let desc = SceneDescription::new("sel")
            .with_object(ObjectDesc::new("Picked", ObjectKind::Mesh).selected())
            .with_object(ObjectDesc::new("Other", ObjectKind::Mesh));
        let mut scene = Scene::from_description(desc).unwrap();
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default()).with_mode(ExportMode::Selection);

        let summary = exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(summary.entities, 1);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.skipped_placements, 1);
    }

    #[test]
    fn test_rejected_camera_fails_in_cameras_phase() {
        let mut scene = shot();
        let mut graph = MemoryGraph::new();
        graph.reject_kind(NodeKind::Camera);
        let mut exporter = Exporter::new(ExportOptions::default());

        let err = exporter.export(&mut scene, &mut graph).unwrap_err();
        assert_eq!(err.phase(), Phase::Cameras);
        assert!(matches!(err, ExportError::Phase { source: GraphError::Rejected { .. }, .. }));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("bake".parse::<ExportMode>(), Ok(ExportMode::Bake));
        assert!("preview".parse::<ExportMode>().is_err());
        assert_eq!(ExportMode::Selection.to_string(), "selection");
    }

    #[test]
    fn test_interactive_disables_motion_blur() {
        let desc = SceneDescription::new("ipr").with_object(
            ObjectDesc::new("Ball", ObjectKind::Mesh)
                .key(9.0, Vec3::ZERO)
                .key(11.0, Vec3::Y),
        );
        let mut scene = Scene::from_description(desc).unwrap();
        let mut graph = MemoryGraph::new();
        let mut exporter =
            Exporter::new(ExportOptions::default().with_motion_blur(3, 2)).with_mode(ExportMode::Interactive);

        let summary = exporter.export(&mut scene, &mut graph).unwrap();
        assert!(summary.motion_steps.is_empty());
        assert!(exporter.state().moving.is_empty());
        assert_eq!(graph.option("relay:interactive"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn test_selection_skips_settings_cameras_and_blur() {
        let desc = SceneDescription::new("sel")
            .with_frame(10)
            .with_object(ObjectDesc::new("Cam", ObjectKind::Camera).selected())
            .with_object(
                ObjectDesc::new("Ball", ObjectKind::Mesh)
                    .key(9.0, Vec3::ZERO)
                    .key(11.0, Vec3::Y)
                    .selected(),
            )
            .with_camera("Cam");
        let mut scene = Scene::from_description(desc).unwrap();
        let mut graph = MemoryGraph::new();
        let mut exporter =
            Exporter::new(ExportOptions::default().with_motion_blur(3, 2)).with_mode(ExportMode::Selection);

        let summary = exporter.export(&mut scene, &mut graph).unwrap();
        assert!(!ExportMode::Selection.phases().contains(&Phase::Cameras));
        assert!(!ExportMode::Selection.phases().contains(&Phase::GlobalSettings));
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.cameras, 0);
        assert_eq!(graph.count_kind(NodeKind::Camera), 0);
        assert_eq!(graph.option("Ri:Frame"), None);
        assert!(summary.motion_steps.is_empty());
        assert!(exporter.state().moving.is_empty());
    }

    fn scatter(instancer_render: bool, instancer_viewport: bool) -> Scene {
        let mut grid = ObjectDesc::new("Grid", ObjectKind::Mesh).instancer(InstancerDesc {
            prototypes: vec!["Proto".into()],
            positions: vec![Vec3::ZERO, Vec3::X],
            show_instancer: true,
            ..Default::default()
        });
        grid.visibility.instancer_render = instancer_render;
        grid.visibility.instancer_viewport = instancer_viewport;
        let desc = SceneDescription::new("scatter")
            .with_object(ObjectDesc::new("Proto", ObjectKind::Mesh).points(vec![Vec3::ZERO]))
            .with_object(grid);
        Scene::from_description(desc).unwrap()
    }

    fn hidden_state(exporter: &Exporter, graph: &MemoryGraph, name: &str) -> Hidden {
        let record = &exporter.state().entities[&EntityId::object(name)];
        graph.node(record.node).unwrap().hidden
    }

    #[test]
    fn test_hidden_instancer_keeps_its_instances() {
        let mut scene = scatter(false, true);
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default());
        exporter.export(&mut scene, &mut graph).unwrap();

        assert_eq!(hidden_state(&exporter, &graph, "Grid"), Hidden::Hide);
        assert_eq!(hidden_state(&exporter, &graph, "Proto"), Hidden::Inherit);
        assert_eq!(exporter.state().entities[&EntityId::object("Proto")].instances.len(), 3);
    }

    #[test]
    fn test_instancer_viewport_flag_applies_interactively() {
        let mut scene = scatter(true, false);
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default());
        exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(hidden_state(&exporter, &graph, "Grid"), Hidden::Inherit);

        let mut exporter = Exporter::new(ExportOptions::default()).with_mode(ExportMode::Interactive);
        exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(hidden_state(&exporter, &graph, "Grid"), Hidden::Hide);
    }

    fn light_rig(rim_in_viewport: bool) -> Scene {
        let light = ObjectKind::Light { filter: false };
        let mut key = ObjectDesc::new("Key", light.clone());
        key.light = Some(LightParams {
            solo: true,
            ..Default::default()
        });
        let mut fill = ObjectDesc::new("Fill", light.clone());
        fill.light = Some(LightParams {
            mute: true,
            ..Default::default()
        });
        let mut rim = ObjectDesc::new("Rim", light);
        rim.visibility.viewport = rim_in_viewport;
        let desc = SceneDescription::new("rig").with_object(key).with_object(fill).with_object(rim);
        Scene::from_description(desc).unwrap()
    }

    #[test]
    fn test_muted_light_is_hidden() {
        let mut scene = light_rig(true);
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default());
        exporter.export(&mut scene, &mut graph).unwrap();

        assert_eq!(hidden_state(&exporter, &graph, "Key"), Hidden::Show);
        assert_eq!(hidden_state(&exporter, &graph, "Fill"), Hidden::Hide);
        assert_eq!(hidden_state(&exporter, &graph, "Rim"), Hidden::Show);
    }

    #[test]
    fn test_solo_hides_every_other_light() {
        let mut scene = light_rig(true);
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default().with_solo_light(true));
        exporter.export(&mut scene, &mut graph).unwrap();

        assert_eq!(hidden_state(&exporter, &graph, "Key"), Hidden::Show);
        assert_eq!(hidden_state(&exporter, &graph, "Fill"), Hidden::Hide);
        assert_eq!(hidden_state(&exporter, &graph, "Rim"), Hidden::Hide);
    }

    #[test]
    fn test_interactive_hides_lights_off_in_viewport() {
        let mut scene = light_rig(false);
        let mut graph = MemoryGraph::new();
        let mut exporter = Exporter::new(ExportOptions::default());
        exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(hidden_state(&exporter, &graph, "Rim"), Hidden::Show);

        let mut exporter = Exporter::new(ExportOptions::default()).with_mode(ExportMode::Interactive);
        exporter.export(&mut scene, &mut graph).unwrap();
        assert_eq!(hidden_state(&exporter, &graph, "Rim"), Hidden::Hide);
        assert_eq!(hidden_state(&exporter, &graph, "Key"), Hidden::Show);
    }
}
