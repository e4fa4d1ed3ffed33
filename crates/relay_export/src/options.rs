//! Export configuration.

use std::collections::BTreeMap;

use relay_core::{AttrValue, SourceEntity};
use relay_math::Shutter;
use serde::{Deserialize, Serialize};

/// Configuration for an export pass.
///
/// Usually read from the `options` block of a scene file:
///
/// ```ignore
/// let options = ExportOptions::from_json_str(r#"{ "motion_blur": true, "motion_segments": 3 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Sample moving entities across the shutter interval
    pub motion_blur: bool,
    /// Transform samples per moving entity
    pub motion_segments: u32,
    /// Deformation samples per deforming entity
    pub deform_motion_segments: u32,
    pub shutter: Shutter,
    /// Add a visible headlight when the scene has no lights
    pub render_default_light: bool,
    /// Render only lights flagged `solo`
    pub solo_light: bool,
    /// Attributes set on the root node
    pub root_attributes: BTreeMap<String, AttrValue>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            motion_blur: false,
            motion_segments: 2,
            deform_motion_segments: 2,
            shutter: Shutter::default(),
            render_default_light: false,
            solo_light: false,
            root_attributes: BTreeMap::new(),
        }
    }
}

impl ExportOptions {
    /// Parse options from JSON.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Parse options from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Enable motion blur with the given segment counts.
    pub fn with_motion_blur(mut self, segments: u32, deform_segments: u32) -> Self {
        self.motion_blur = true;
        self.motion_segments = segments;
        self.deform_motion_segments = deform_segments;
        self
    }

    pub fn with_shutter(mut self, shutter: Shutter) -> Self {
        self.shutter = shutter;
        self
    }

    pub fn with_default_light(mut self, enabled: bool) -> Self {
        self.render_default_light = enabled;
        self
    }

    pub fn with_solo_light(mut self, enabled: bool) -> Self {
        self.solo_light = enabled;
        self
    }

    /// Transform and deformation segment counts for one entity.
    pub fn segments_for(&self, entity: &SourceEntity) -> (u32, u32) {
        if entity.motion.enabled {
            (entity.motion.segments, entity.motion.deform_segments)
        } else {
            (self.motion_segments, self.deform_motion_segments)
        }
    }

    /// Whether the options ask for blur the shutter can deliver.
    pub fn samples_motion(&self) -> bool {
        self.motion_blur && self.shutter.is_open()
    }

    /// Sample offsets for `segments`, strictly increasing, or nothing when
    /// there is no blur to sample.
    pub fn steps_for(&self, segments: u32) -> Vec<f32> {
        if segments < 2 {
            return Vec::new();
        }
        let mut steps = self.shutter.subframes(segments);
        steps.sort_by(f32::total_cmp);
        steps.dedup_by(|a, b| a.total_cmp(b).is_eq());
        if steps.len() < 2 {
            return Vec::new();
        }
        steps
    }
}
