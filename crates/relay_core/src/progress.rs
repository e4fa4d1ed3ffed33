//! Export progress reporting.

/// Receives `(label, fraction)` updates roughly once per processed item.
///
/// Implementations must return quickly and never fail; the exporter does not
/// wait on them.
pub trait ProgressSink {
    fn set_export_stats(&self, label: &str, fraction: f32);
}

/// Forwards progress to the `log` facade at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_export_stats(&self, label: &str, fraction: f32) {
        log::trace!("{label}: {:.0}%", fraction.clamp(0.0, 1.0) * 100.0);
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_export_stats(&self, _label: &str, _fraction: f32) {}
}
