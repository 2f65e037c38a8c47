use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::cycle::{count_lines, run_cycle, CycleContext};
use super::matcher::{pattern_for, TimestampPattern};
use crate::cancel::CancellationFlag;
use crate::config::{EncodingMode, UnstampConfig};
use crate::errors::UnstampResult;
use crate::progress::{
    cycle_status, ProgressSink, ProgressTracker, STATUS_ANALYZING, STATUS_PROCESSING,
};
use crate::results::{ProcessingOutcome, ProcessingResult};

/// Upper bound on passes over a file, whether or not it has converged
pub const MAX_CYCLES: u32 = 3;

const TEMP_SUFFIX: &str = ".tmp";

/// The sibling file a cycle writes into: `<path>.tmp`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Deletes a cycle's temp file if present. Failure is only logged.
fn cleanup_temp_file(temp: &Path) {
    if !temp.exists() {
        return;
    }
    match fs::remove_file(temp) {
        Ok(()) => debug!("Temporary file deleted: {}", temp.display()),
        Err(e) => warn!("Failed to delete temporary file {}: {}", temp.display(), e),
    }
}

/// Repeatedly strips a file in place until it stops changing.
#[derive(Debug, Clone)]
pub struct FileProcessor {
    pattern: &'static TimestampPattern,
    encoding_mode: EncodingMode,
    preserve_permissions: bool,
}

impl FileProcessor {
    /// Creates a processor with default encoding and permission handling
    pub fn new(anchored_to_start: bool) -> Self {
        Self {
            pattern: pattern_for(anchored_to_start),
            encoding_mode: EncodingMode::default(),
            preserve_permissions: true,
        }
    }

    pub fn from_config(config: &UnstampConfig) -> Self {
        Self {
            pattern: pattern_for(config.anchored_to_start),
            encoding_mode: config.encoding_mode,
            preserve_permissions: config.preserve_permissions,
        }
    }

    pub fn with_encoding_mode(mut self, encoding_mode: EncodingMode) -> Self {
        self.encoding_mode = encoding_mode;
        self
    }

    /// Strips `path` in place.
    ///
    /// Each cycle streams the current file into `<path>.tmp`. A cycle that
    /// modified something is promoted over `path` with a single rename; a
    /// cycle that modified nothing means the file has converged and the temp
    /// file is dropped. At most [`MAX_CYCLES`] cycles run.
    ///
    /// Cancellation is polled between lines and between cycles. A cancelled
    /// cycle is discarded, so `path` keeps the content of the last committed
    /// cycle and the returned totals only cover committed cycles.
    ///
    /// On error the current temp file is removed and `path` holds whatever
    /// the last successful promotion left there.
    pub fn process(
        &self,
        path: &Path,
        cancel: &CancellationFlag,
        sink: &dyn ProgressSink,
    ) -> UnstampResult<ProcessingOutcome> {
        let file_name = display_name(path);
        info!("Using pattern: {}", self.pattern.as_str());

        let tracker = ProgressTracker::new(sink);
        tracker.status(STATUS_ANALYZING);

        let total_lines = count_lines(path, cancel)?;
        if cancel.is_cancelled() {
            info!("Cancelled while analyzing {}", file_name);
            tracker.finish();
            return Ok(ProcessingOutcome::Cancelled(ProcessingResult::new()));
        }
        info!("Total lines to process in {}: {}", file_name, total_lines);

        tracker.status(STATUS_PROCESSING);
        let temp = temp_path_for(path);
        let mut totals = ProcessingResult::new();
        let mut cycle = 0;

        loop {
            cycle += 1;
            tracker.status(&cycle_status(cycle, MAX_CYCLES));

            let ctx = CycleContext {
                pattern: self.pattern,
                encoding_mode: self.encoding_mode,
                cancel,
                tracker: &tracker,
                total_lines,
                cycle,
                max_cycles: MAX_CYCLES,
            };
            let cycle_result = match run_cycle(path, &temp, &ctx) {
                Ok(result) => result,
                Err(e) => {
                    cleanup_temp_file(&temp);
                    return Err(e);
                }
            };

            if cancel.is_cancelled() {
                info!(
                    "Cycle {} cancelled after {} lines; discarding it",
                    cycle, cycle_result.processed_lines
                );
                cleanup_temp_file(&temp);
                tracker.finish();
                return Ok(ProcessingOutcome::Cancelled(totals));
            }

            totals.add_cycle(cycle_result);

            if !cycle_result.made_changes() {
                cleanup_temp_file(&temp);
                info!("Cycle {} completed. No changes made.", cycle);
                break;
            }

            if let Err(e) = self.promote(&temp, path) {
                cleanup_temp_file(&temp);
                return Err(e);
            }
            info!(
                "Cycle {} completed: processed {} lines, modified {} lines",
                cycle, cycle_result.processed_lines, cycle_result.modified_lines
            );

            if cycle >= MAX_CYCLES {
                info!("Cycle cap of {} reached for {}", MAX_CYCLES, file_name);
                break;
            }
            if cancel.is_cancelled() {
                info!("Cancelled between cycles of {}", file_name);
                tracker.finish();
                return Ok(ProcessingOutcome::Cancelled(totals));
            }
        }

        tracker.finish();
        info!(
            "Processing completed after {} cycles. Total modified lines: {}",
            cycle, totals.modified_lines
        );
        Ok(ProcessingOutcome::Completed(totals))
    }

    /// Replaces `path` with the fully written `temp` in one rename
    fn promote(&self, temp: &Path, path: &Path) -> UnstampResult<()> {
        if self.preserve_permissions {
            let permissions = fs::metadata(path)?.permissions();
            fs::set_permissions(temp, permissions)?;
        }
        fs::rename(temp, path)?;
        Ok(())
    }
}

/// File name used in status lines
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UnstampError;
    use crate::progress::tests::RecordingSink;
    use crate::progress::NoopSink;
    use tempfile::{tempdir, TempDir};

    fn write_log(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("app.log");
        fs::write(&path, content).unwrap();
        path
    }

    /// Raises the cancellation flag when a given status is published
    struct CancelOnStatus {
        trigger: String,
        cancel: CancellationFlag,
    }

    impl ProgressSink for CancelOnStatus {
        fn progress(&self, _fraction: f64) {}

        fn status(&self, message: &str) {
            if message == self.trigger {
                self.cancel.cancel();
            }
        }
    }

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path_for(Path::new("/var/log/app.log")),
            PathBuf::from("/var/log/app.log.tmp")
        );
        assert_eq!(temp_path_for(Path::new("noext")), PathBuf::from("noext.tmp"));
    }

    #[test]
    fn test_empty_file_converges_in_one_cycle() {
        let dir = tempdir().unwrap();
        let path = write_log(&dir, "");
        let sink = RecordingSink::default();

        let outcome = FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &sink)
            .unwrap();

        assert_eq!(outcome, ProcessingOutcome::Completed(ProcessingResult::new()));
        let statuses = sink.statuses.lock().unwrap().clone();
        assert!(statuses.contains(&"Processing cycle 1/3...".to_string()));
        assert!(!statuses.contains(&"Processing cycle 2/3...".to_string()));
        assert!(!temp_path_for(&path).exists());
        assert_eq!(*sink.fractions.lock().unwrap().last().unwrap(), 1.0);
    }

    #[test]
    fn test_single_change_stops_after_second_cycle() {
        let dir = tempdir().unwrap();
        let path = write_log(&dir, "one\ntwo\n2024-01-15 three\nfour\nfive\n");
        let sink = RecordingSink::default();

        let outcome = FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &sink)
            .unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Completed(ProcessingResult {
                files_changed: true,
                processed_lines: 10,
                modified_lines: 1,
            })
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "one\ntwo\nthree\nfour\nfive\n"
        );
        let statuses = sink.statuses.lock().unwrap().clone();
        assert_eq!(
            statuses,
            vec![
                "Analyzing file...",
                "Processing file...",
                "Processing cycle 1/3...",
                "Processing cycle 2/3...",
            ]
        );
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_cycle_cap_limits_passes() {
        let dir = tempdir().unwrap();
        let path = write_log(&dir, "10:00:00 11:00:00 12:00:00 13:00:00 msg\n");

        let outcome = FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap();

        assert_eq!(
            outcome.result(),
            ProcessingResult {
                files_changed: true,
                processed_lines: 3,
                modified_lines: 3,
            }
        );
        // exactly three anchored passes
        assert_eq!(fs::read_to_string(&path).unwrap(), "13:00:00 msg\n");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_rerun_after_convergence_changes_nothing() {
        let dir = tempdir().unwrap();
        let path = write_log(&dir, "2024-01-15 10:00:00.123 started\nplain\n");
        let processor = FileProcessor::new(false);

        let first = processor
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap();
        assert!(first.result().files_changed);
        let converged = fs::read_to_string(&path).unwrap();
        assert_eq!(converged, "started\nplain\n");

        let second = processor
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap();
        assert_eq!(
            second,
            ProcessingOutcome::Completed(ProcessingResult {
                files_changed: false,
                processed_lines: 2,
                modified_lines: 0,
            })
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), converged);
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempdir().unwrap();
        let original = "2024-01-15 a\n";
        let path = write_log(&dir, original);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let sink = RecordingSink::default();

        let outcome = FileProcessor::new(true).process(&path, &cancel, &sink).unwrap();

        assert_eq!(outcome, ProcessingOutcome::Cancelled(ProcessingResult::new()));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!temp_path_for(&path).exists());
        assert_eq!(*sink.fractions.lock().unwrap().last().unwrap(), 1.0);
    }

    #[test]
    fn test_cancel_mid_run_keeps_committed_cycles() {
        let dir = tempdir().unwrap();
        let path = write_log(&dir, "10:00:00 11:00:00 12:00:00 a\nb\n");
        let cancel = CancellationFlag::new();
        let sink = CancelOnStatus {
            trigger: cycle_status(2, MAX_CYCLES),
            cancel: cancel.clone(),
        };

        let outcome = FileProcessor::new(true).process(&path, &cancel, &sink).unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Cancelled(ProcessingResult {
                files_changed: true,
                processed_lines: 2,
                modified_lines: 1,
            })
        );
        // only cycle 1 was committed
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "11:00:00 12:00:00 a\nb\n"
        );
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_cancel_in_first_cycle_leaves_source_untouched() {
        let dir = tempdir().unwrap();
        let original = "2024-01-15 a\n2024-01-15 b\n";
        let path = write_log(&dir, original);
        let cancel = CancellationFlag::new();
        let sink = CancelOnStatus {
            trigger: cycle_status(1, MAX_CYCLES),
            cancel: cancel.clone(),
        };

        let outcome = FileProcessor::new(true).process(&path, &cancel, &sink).unwrap();

        assert_eq!(outcome, ProcessingOutcome::Cancelled(ProcessingResult::new()));
        assert!(!outcome.result().files_changed);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = FileProcessor::new(true)
            .process(
                &dir.path().join("missing.log"),
                &CancellationFlag::new(),
                &NoopSink,
            )
            .unwrap_err();
        assert!(matches!(err, UnstampError::FileNotFound(_)));
    }

    #[test]
    fn test_unwritable_temp_leaves_source_untouched() {
        let dir = tempdir().unwrap();
        let original = "2024-01-15 a\n";
        let path = write_log(&dir, original);
        // a directory squatting on the temp path makes creating it fail
        fs::create_dir(temp_path_for(&path)).unwrap();

        let result = FileProcessor::new(true).process(&path, &CancellationFlag::new(), &NoopSink);

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_encoding_failure_leaves_source_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let original: &[u8] = b"2024-01-15 a\n\xff\xfe\n";
        fs::write(&path, original).unwrap();

        let err = FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap_err();

        assert!(matches!(err, UnstampError::EncodingError { line: 2, .. }));
        assert_eq!(fs::read(&path).unwrap(), original);
        assert!(!temp_path_for(&path).exists());

        let outcome = FileProcessor::new(true)
            .with_encoding_mode(EncodingMode::Lossy)
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap();
        assert_eq!(outcome.result().modified_lines, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = write_log(&dir, "2024-01-15 a\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &NoopSink)
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_progress_is_monotonic_and_finishes() {
        let dir = tempdir().unwrap();
        let content: String = (0..50)
            .map(|i| {
                if i % 7 == 0 {
                    format!("10:00:{:02} line {}\n", i, i)
                } else {
                    format!("line {}\n", i)
                }
            })
            .collect();
        let path = write_log(&dir, &content);
        let sink = RecordingSink::default();

        FileProcessor::new(true)
            .process(&path, &CancellationFlag::new(), &sink)
            .unwrap();

        let fractions = sink.fractions.lock().unwrap().clone();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }
}
