//! Relay Export - translate a source scene into a retained render graph.
//!
//! This crate provides:
//!
//! - **Translators**: per-category node builders behind the [`Translator`]
//!   trait, looked up through a [`TranslatorRegistry`]
//! - **Instancing**: the [`InstanceResolver`], which places every entity's
//!   geometry once and every placement as its own group
//! - **Motion blur**: the [`MotionSampler`] sweep over shutter offsets
//! - **Orchestration**: the phased [`Exporter`] pass and its summary
//!
//! # Example
//!
//! ```ignore
//! use relay_core::{load_scene, MemoryGraph};
//! use relay_export::{ExportOptions, Exporter};
//!
//! let mut scene = load_scene("assets/turntable.json")?;
//! let mut graph = MemoryGraph::new();
//! let summary = Exporter::new(ExportOptions::default()).export(&mut scene, &mut graph)?;
//! print!("{}", graph.outline());
//! ```

pub mod category;
pub mod exporter;
pub mod instance;
pub mod motion;
pub mod options;
pub mod records;
pub mod state;
pub mod translator;

// Re-export commonly used types
pub use category::{Category, UnsupportedCategory};
pub use exporter::{CancelToken, ExportError, ExportMode, ExportResult, ExportSummary, Exporter, Phase};
pub use instance::{InstanceResolver, Resolution, SkipReason};
pub use motion::{CursorGuard, MotionSampler, SweepReport, SweepState};
pub use options::ExportOptions;
pub use records::{EntityRecord, GroupRecord, MaterialRecord, PlacementKey};
pub use state::PassState;
pub use translator::{
    CameraTranslator, EmptyTranslator, GeometryTranslator, GroupTranslator, LightTranslator,
    MaterialTranslator, ParticlesTranslator, Translator, TranslatorRegistry,
};
