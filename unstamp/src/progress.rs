//! Progress and status reporting.
//!
//! The core never talks to a UI. It publishes a normalized fraction and
//! human-readable status text through a [`ProgressSink`], and the
//! presentation layer decides how (and how often) to show them.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::results::ProcessingResult;

pub const STATUS_READY: &str = "Status: Ready";
pub const STATUS_ANALYZING: &str = "Analyzing file...";
pub const STATUS_PROCESSING: &str = "Processing file...";
pub const STATUS_FAILED: &str = "Status: Failed";
pub const STATUS_CANCELLED: &str = "Status: Cancelled";
pub const STATUS_CANCELLED_BY_USER: &str = "Status: Cancelled by user";

/// Status shown at the start of each cycle
pub fn cycle_status(cycle: u32, max_cycles: u32) -> String {
    format!("Processing cycle {}/{}...", cycle, max_cycles)
}

/// Terminal status for a run that finished without being cancelled
pub fn completion_status(file_name: &str, result: &ProcessingResult) -> String {
    if result.files_changed {
        format!(
            "Status: Completed - {} ({}/{} lines modified)",
            file_name, result.modified_lines, result.processed_lines
        )
    } else {
        format!("Status: No changes needed - {}", file_name)
    }
}

/// Overall progress of a run, in `[0, 1]`.
///
/// The denominator assumes one more cycle than the current one while changes
/// are still being found, capped at `max_cycles`. An empty file counts as a
/// fully progressed cycle.
pub fn overall_progress(
    processed_lines: u64,
    total_lines: u64,
    cycle: u32,
    max_cycles: u32,
    changed_so_far: bool,
) -> f64 {
    let cycle_progress = if total_lines == 0 {
        1.0
    } else {
        (processed_lines as f64 / total_lines as f64).min(1.0)
    };
    let anticipated = (cycle + u32::from(changed_so_far)).min(max_cycles).max(1);
    let done = f64::from(cycle.saturating_sub(1)) + cycle_progress;
    (done / f64::from(anticipated)).clamp(0.0, 1.0)
}

/// Receiver of progress and status updates.
///
/// Implementations must not block for long: they are called from the worker
/// once per processed line.
pub trait ProgressSink: Send + Sync {
    /// A new overall fraction in `[0, 1]`
    fn progress(&self, fraction: f64);

    /// A new status message
    fn status(&self, message: &str);
}

/// Sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn progress(&self, _fraction: f64) {}

    fn status(&self, _message: &str) {}
}

/// Keeps the published fraction monotonically non-decreasing within a run.
///
/// The anticipated-cycle denominator can grow mid-cycle, which would make the
/// raw fraction step backwards; the tracker only forwards new highs.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    high_water: AtomicU64,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            high_water: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Highest fraction published so far
    pub fn current(&self) -> f64 {
        f64::from_bits(self.high_water.load(Ordering::Relaxed))
    }

    /// Publishes the progress for the given position, if it is a new high
    pub fn report(
        &self,
        processed_lines: u64,
        total_lines: u64,
        cycle: u32,
        max_cycles: u32,
        changed_so_far: bool,
    ) {
        let fraction =
            overall_progress(processed_lines, total_lines, cycle, max_cycles, changed_so_far);
        if fraction > self.current() {
            self.high_water.store(fraction.to_bits(), Ordering::Relaxed);
            self.sink.progress(fraction);
        }
    }

    /// Forces the bar to 100%
    pub fn finish(&self) {
        self.high_water.store(1f64.to_bits(), Ordering::Relaxed);
        self.sink.progress(1.0);
    }

    pub fn status(&self, message: &str) {
        self.sink.status(message);
    }
}
