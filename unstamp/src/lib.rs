pub mod cancel;
pub mod config;
pub mod errors;
pub mod progress;
pub mod results;
pub mod strip;
pub mod task;

pub use cancel::CancellationFlag;
pub use crate::config::{CliOverrides, EncodingMode, UnstampConfig};
pub use errors::{UnstampError, UnstampResult};
pub use progress::{NoopSink, ProgressSink};
pub use results::{CycleResult, ProcessingOutcome, ProcessingResult};
pub use strip::{process, FileProcessor, MAX_CYCLES};
pub use task::{start_processing, start_with, ProcessingHandle, TaskEvent, TaskOutcome};
