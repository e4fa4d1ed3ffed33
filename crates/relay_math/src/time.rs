//! Motion-blur time math.
//!
//! Motion samples are expressed as offsets relative to the current frame.
//! A [`Shutter`] turns a segment count into those offsets, and a [`Cursor`]
//! turns an offset back into the (frame, subframe) pair the host scene is
//! re-evaluated at.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Where the shutter interval sits relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterTiming {
    /// Shutter opens on the frame
    FrameOpen,
    /// Shutter is centered on the frame
    #[default]
    FrameCenter,
    /// Shutter closes on the frame
    FrameClose,
}

/// Camera shutter used to place motion samples in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shutter {
    /// Shutter angle in degrees (360 = one full frame)
    pub angle: f32,
    /// Placement of the open interval relative to the frame
    pub timing: ShutterTiming,
}

impl Default for Shutter {
    fn default() -> Self {
        Self {
            angle: 180.0,
            timing: ShutterTiming::FrameCenter,
        }
    }
}

impl Shutter {
    /// Create a shutter from an angle and timing.
    pub fn new(angle: f32, timing: ShutterTiming) -> Self {
        Self { angle, timing }
    }

    /// Length of the open interval in frames.
    pub fn interval(&self) -> f32 {
        self.angle / 360.0
    }

    /// Offset (in frames) at which the shutter opens.
    pub fn start(&self) -> f32 {
        match self.timing {
            ShutterTiming::FrameOpen => 0.0,
            ShutterTiming::FrameCenter => -0.5 * self.interval(),
            ShutterTiming::FrameClose => -self.interval(),
        }
    }

    /// Offset (in frames) at which the shutter closes.
    pub fn end(&self) -> f32 {
        self.start() + self.interval()
    }

    /// Whether the shutter stays open for a positive, finite interval.
    pub fn is_open(&self) -> bool {
        self.angle.is_finite() && self.angle > 0.0
    }

    /// Evenly spaced sample offsets covering the open interval, ascending.
    ///
    /// Zero segments yields no samples and a single segment samples the
    /// opening time only. A shutter that never opens has no samples.
    pub fn subframes(&self, segments: u32) -> Vec<f32> {
        if !self.is_open() {
            return Vec::new();
        }
        let start = self.start();
        match segments {
            0 => Vec::new(),
            1 => vec![start],
            n => {
                let step = self.interval() / (n - 1) as f32;
                (0..n).map(|i| start + i as f32 * step).collect()
            }
        }
    }
}

/// A motion offset usable as a set/map key.
///
/// Offsets produced by [`Shutter::subframes`] are compared bit-exactly, which
/// is what lets a per-entity sample list be matched against the scene-wide
/// step set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionStep(pub f32);

impl MotionStep {
    pub fn offset(self) -> f32 {
        self.0
    }
}

impl PartialEq for MotionStep {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for MotionStep {}

impl PartialOrd for MotionStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MotionStep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for MotionStep {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f32> for MotionStep {
    fn from(offset: f32) -> Self {
        Self(offset)
    }
}

/// Evaluation point of the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub frame: i32,
    pub subframe: f32,
}

impl Cursor {
    pub fn new(frame: i32, subframe: f32) -> Self {
        Self { frame, subframe }
    }

    /// Cursor for a motion offset relative to `frame`.
    ///
    /// Negative offsets borrow from the previous frame so the subframe is
    /// always in `[0, 1)` for offsets within one frame.
    pub fn at_offset(frame: i32, offset: f32) -> Self {
        if offset < 0.0 {
            Self::new(frame - 1, 1.0 + offset)
        } else {
            Self::new(frame, offset)
        }
    }

    /// Continuous time in frames.
    pub fn time(&self) -> f32 {
        self.frame as f32 + self.subframe
    }
}

/// Shift sorted offsets so the first one lands on zero.
pub fn normalize_steps(steps: &[f32]) -> Vec<f32> {
    let delta = steps.first().map(|s| -s).unwrap_or(0.0);
    steps.iter().map(|s| s + delta).collect()
}
