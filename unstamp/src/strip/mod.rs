//! Timestamp stripping, from single lines up to whole files.
//!
//! # Layers
//!
//! 1. [`matcher`]: the two compiled timestamp patterns and the per-line
//!    transform.
//! 2. [`cycle`]: one streaming pass from a file into its `<path>.tmp`
//!    sibling, polling cancellation between lines and reporting progress.
//! 3. [`processor`]: the convergence loop that repeats passes, promoting
//!    each changed pass over the source with a rename, until a pass changes
//!    nothing or [`MAX_CYCLES`] passes have run.
//!
//! # Safety of the source file
//!
//! The source is only ever replaced by a complete, flushed and synced temp
//! file via [`std::fs::rename`]. A failed or cancelled pass is discarded, so
//! the source always holds either its original content or the output of the
//! last committed pass.
//!
//! ```rust,ignore
//! let outcome = unstamp::strip::process(Path::new("app.log"), true, &CancellationFlag::new())?;
//! println!("{} lines modified", outcome.result().modified_lines);
//! ```

pub mod cycle;
pub mod matcher;
pub mod processor;

use std::path::Path;

pub use cycle::{count_lines, run_cycle, strip_lines, CycleContext};
pub use matcher::{pattern_for, transform_line, LineResult, MatchMode, TimestampPattern};
pub use processor::{display_name, temp_path_for, FileProcessor, MAX_CYCLES};

use crate::cancel::CancellationFlag;
use crate::errors::UnstampResult;
use crate::progress::NoopSink;
use crate::results::ProcessingOutcome;

/// Strips `path` in place with default settings and no progress reporting
pub fn process(
    path: &Path,
    anchored_to_start: bool,
    cancel: &CancellationFlag,
) -> UnstampResult<ProcessingOutcome> {
    FileProcessor::new(anchored_to_start).process(path, cancel, &NoopSink)
}
