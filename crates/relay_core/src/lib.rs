//! Relay Core - collaborator contracts for scene translation.
//!
//! This crate provides:
//!
//! - **Source scene**: evaluated entities, placements and materials behind
//!   the [`SourceScene`] trait, plus an in-memory keyframed [`Scene`]
//! - **Target graph**: the retained renderer graph behind the
//!   [`SceneGraph`] trait, plus the inspectable [`MemoryGraph`]
//! - **Progress**: the non-blocking [`ProgressSink`] stats hook
//!
//! # Example
//!
//! ```ignore
//! use relay_core::{load_scene, SourceScene};
//!
//! let scene = load_scene("shot.json")?;
//! println!("{} entities, {} placements",
//!     scene.entities().len(),
//!     scene.placements().len());
//! ```

pub mod graph;
pub mod ids;
pub mod progress;
pub mod scene;
pub mod source;

// Re-export commonly used types
pub use graph::{AttrValue, GraphError, GraphResult, Hidden, MemoryGraph, NodeId, NodeKind, SceneGraph};
pub use ids::{EntityId, MaterialId};
pub use progress::{LogProgress, NullProgress, ProgressSink};
pub use scene::{load_scene, load_scene_from_str, LoadError, LoadResult, Scene, SceneDescription};
pub use source::{
    CameraParams, Geometry, LightParams, MotionOverride, ObjectKind, ParticleSettings,
    ParticleSystem, Placement, SourceEntity, SourceError, SourceMaterial, SourceResult,
    SourceScene, Visibility,
};
