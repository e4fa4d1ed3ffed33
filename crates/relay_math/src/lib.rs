// Re-export glam for convenience
pub use glam::*;

// Relay math types
mod time;
mod transform;
pub use time::{normalize_steps, Cursor, MotionStep, Shutter, ShutterTiming};
pub use transform::{points_as_floats, Mat4Ext};
