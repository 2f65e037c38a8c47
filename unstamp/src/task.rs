//! Background execution of a stripping run.
//!
//! [`start_processing`] moves a run onto one dedicated worker thread and
//! returns a [`ProcessingHandle`]. The caller never blocks on the worker: it
//! can read the latest progress and status at any time, drain the event
//! channel, raise the cancellation flag, and finally collect a
//! [`TaskOutcome`].
//!
//! Events are published without back-pressure. The channel is bounded and
//! events that do not fit are dropped; [`ProcessingHandle::progress`] and
//! [`ProcessingHandle::status`] always hold the latest values regardless.
//! The channel disconnects once the worker has finished, so
//! `for event in handle.events()` terminates on its own.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::cancel::CancellationFlag;
use crate::errors::{UnstampError, UnstampResult};
use crate::progress::{
    completion_status, ProgressSink, STATUS_CANCELLED, STATUS_CANCELLED_BY_USER, STATUS_FAILED,
    STATUS_READY,
};
use crate::results::{ProcessingOutcome, ProcessingResult};
use crate::strip::{display_name, FileProcessor};

const EVENT_CAPACITY: usize = 256;

/// An update published by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Progress(f64),
    Status(String),
}

/// Terminal outcome of a background run
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(ProcessingResult),
    Cancelled(ProcessingResult),
    Failed(UnstampError),
}

impl From<UnstampResult<ProcessingOutcome>> for TaskOutcome {
    fn from(result: UnstampResult<ProcessingOutcome>) -> Self {
        match result {
            Ok(ProcessingOutcome::Completed(result)) => TaskOutcome::Completed(result),
            Ok(ProcessingOutcome::Cancelled(result)) => TaskOutcome::Cancelled(result),
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}

/// Latest values, readable from any thread
#[derive(Debug)]
struct SharedState {
    progress: AtomicU64,
    status: Mutex<String>,
    cancelled_by_user: AtomicBool,
}

impl SharedState {
    fn new() -> Self {
        Self {
            progress: AtomicU64::new(0f64.to_bits()),
            status: Mutex::new(STATUS_READY.to_string()),
            cancelled_by_user: AtomicBool::new(false),
        }
    }

    fn set_status(&self, message: &str) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.clear();
        status.push_str(message);
    }
}

/// The worker's sink; owns the only sender so the channel closes with the worker
struct WorkerSink {
    shared: Arc<SharedState>,
    events: Sender<TaskEvent>,
}

impl WorkerSink {
    fn publish_status(&self, message: &str) {
        self.shared.set_status(message);
        let _ = self.events.try_send(TaskEvent::Status(message.to_string()));
    }
}

impl ProgressSink for WorkerSink {
    fn progress(&self, fraction: f64) {
        self.shared
            .progress
            .store(fraction.to_bits(), Ordering::Relaxed);
        let _ = self.events.try_send(TaskEvent::Progress(fraction));
    }

    fn status(&self, message: &str) {
        self.publish_status(message);
    }
}

/// Observation and control surface for a running task
#[derive(Debug)]
pub struct ProcessingHandle {
    shared: Arc<SharedState>,
    events: Receiver<TaskEvent>,
    cancel: CancellationFlag,
    worker: JoinHandle<TaskOutcome>,
}

impl ProcessingHandle {
    /// Latest overall progress in `[0, 1]`
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    /// Latest status text
    pub fn status(&self) -> String {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stream of progress and status updates
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.events
    }

    /// Asks the worker to stop at its next checkpoint.
    ///
    /// The terminal status is always published by the worker, so cancelling a
    /// finished task leaves its status and outcome alone.
    pub fn cancel(&self) {
        if self.is_finished() {
            debug!("Cancellation ignored; task already finished");
            return;
        }
        // ordered before the flag so the worker sees who cancelled
        self.shared.cancelled_by_user.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        info!("Task cancellation requested by user");
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Blocks until the worker is done and returns its outcome
    pub fn wait(self) -> TaskOutcome {
        match self.worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                self.shared.set_status(STATUS_FAILED);
                TaskOutcome::Failed(UnstampError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "processing thread panicked",
                )))
            }
        }
    }
}

/// Starts stripping `path` on a background thread with default settings
pub fn start_processing(
    path: impl Into<PathBuf>,
    anchored_to_start: bool,
    cancel: CancellationFlag,
) -> UnstampResult<ProcessingHandle> {
    start_with(FileProcessor::new(anchored_to_start), path, cancel)
}

/// Starts stripping `path` on a background thread with a configured processor
pub fn start_with(
    processor: FileProcessor,
    path: impl Into<PathBuf>,
    cancel: CancellationFlag,
) -> UnstampResult<ProcessingHandle> {
    let path = path.into();
    let shared = Arc::new(SharedState::new());
    let (sender, events) = bounded(EVENT_CAPACITY);

    let sink = WorkerSink {
        shared: Arc::clone(&shared),
        events: sender,
    };
    let worker_cancel = cancel.clone();

    info!("Processing file: {}", path.display());
    let worker = thread::Builder::new()
        .name("unstamp-worker".to_string())
        .spawn(move || run_task(&processor, &path, &worker_cancel, &sink))?;

    Ok(ProcessingHandle {
        shared,
        events,
        cancel,
        worker,
    })
}

fn run_task(
    processor: &FileProcessor,
    path: &std::path::Path,
    cancel: &CancellationFlag,
    sink: &WorkerSink,
) -> TaskOutcome {
    let outcome = TaskOutcome::from(processor.process(path, cancel, sink));

    match &outcome {
        TaskOutcome::Completed(result) => {
            sink.publish_status(&completion_status(&display_name(path), result));
        }
        TaskOutcome::Cancelled(_) => {
            if sink.shared.cancelled_by_user.load(Ordering::SeqCst) {
                sink.publish_status(STATUS_CANCELLED_BY_USER);
            } else {
                sink.publish_status(STATUS_CANCELLED);
            }
        }
        TaskOutcome::Failed(e) => {
            error!("Task failed: {}", e);
            sink.publish_status(STATUS_FAILED);
        }
    }

    outcome
}
