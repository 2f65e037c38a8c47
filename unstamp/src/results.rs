use serde::Serialize;

/// Summary of one full pass over a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleResult {
    /// Lines read and written during the pass
    pub processed_lines: u64,
    /// Lines whose content changed during the pass
    pub modified_lines: u64,
}

impl CycleResult {
    /// Whether the pass changed anything
    pub fn made_changes(&self) -> bool {
        self.modified_lines > 0
    }
}

/// Terminal totals of a whole run, summed over all cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    /// Whether any cycle committed a change to the file
    pub files_changed: bool,
    /// Lines processed across all cycles
    pub processed_lines: u64,
    /// Lines modified across all cycles
    pub modified_lines: u64,
}

impl ProcessingResult {
    /// Creates an empty result
    pub fn new() -> Self {
        Default::default()
    }

    /// Folds a cycle's counts into the running totals
    pub fn add_cycle(&mut self, cycle: CycleResult) {
        self.processed_lines += cycle.processed_lines;
        self.modified_lines += cycle.modified_lines;
        self.files_changed = self.modified_lines > 0;
    }
}

/// How a run ended when it did not fail.
///
/// Cancellation is a normal exit, so it lives next to completion rather than
/// in [`UnstampError`](crate::errors::UnstampError).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// The loop converged or hit the cycle cap
    Completed(ProcessingResult),
    /// The cancellation flag was observed; totals reflect partial progress
    Cancelled(ProcessingResult),
}

impl ProcessingOutcome {
    /// The totals carried by either variant
    pub fn result(&self) -> ProcessingResult {
        match self {
            ProcessingOutcome::Completed(result) | ProcessingOutcome::Cancelled(result) => *result,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessingOutcome::Cancelled(_))
    }
}
