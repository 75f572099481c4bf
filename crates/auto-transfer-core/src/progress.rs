use crate::transfer::{Operation, Outcome};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const MIB: f64 = 1024.0 * 1024.0;

/// Trait for observing a transfer run.
///
/// CLI implements with indicatif bars, the action log writes CSV rows, the
/// coordinator keeps the latest snapshot. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _plan: &RunPlan) {}
    fn on_file_action(&self, _action: &FileAction) {}
    fn on_file_progress(&self, _progress: &TransferProgress) {}
    fn on_run_complete(&self, _outcome: &Outcome) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Forwards every event to each member in order.
#[derive(Default, Clone)]
pub struct ReporterSet {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl ProgressReporter for ReporterSet {
    fn on_run_start(&self, plan: &RunPlan) {
        self.reporters.iter().for_each(|r| r.on_run_start(plan));
    }

    fn on_file_action(&self, action: &FileAction) {
        self.reporters.iter().for_each(|r| r.on_file_action(action));
    }

    fn on_file_progress(&self, progress: &TransferProgress) {
        self.reporters.iter().for_each(|r| r.on_file_progress(progress));
    }

    fn on_run_complete(&self, outcome: &Outcome) {
        self.reporters.iter().for_each(|r| r.on_run_complete(outcome));
    }
}

/// What a run is about to do, emitted once filtering and ordering are done.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub operation: Operation,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub total_in_source: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub bytes_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Skip,
    Move,
    Copy,
    Delete,
}

impl From<Operation> for ActionKind {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Move => ActionKind::Move,
            Operation::Copy => ActionKind::Copy,
            Operation::Delete => ActionKind::Delete,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Skip => "SKIP",
            ActionKind::Move => "MOVE",
            ActionKind::Copy => "COPY",
            ActionKind::Delete => "DELETE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    WrongFileType,
    NotOldEnough { modified: SystemTime },
    FailedSizeMismatch,
    CancelledAfterCopy,
    DriveError(String),
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Success => f.write_str("SUCCESS"),
            ActionStatus::WrongFileType => f.write_str("WRONG_FILE_TYPE"),
            ActionStatus::NotOldEnough { modified } => {
                let modified: DateTime<Local> = (*modified).into();
                write!(f, "NOT_OLD_ENOUGH|Modified:{}", modified.format("%Y-%m-%d %H:%M:%S"))
            }
            ActionStatus::FailedSizeMismatch => f.write_str("FAILED_SIZE_MISMATCH"),
            ActionStatus::CancelledAfterCopy => f.write_str("CANCELLED_AFTER_COPY"),
            ActionStatus::DriveError(e) => write!(f, "DRIVE_ERROR: {}", e),
        }
    }
}

/// One per-file action: a skip, a finished operation, or a failed one.
#[derive(Debug, Clone)]
pub struct FileAction {
    pub kind: ActionKind,
    pub file_name: String,
    pub status: ActionStatus,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    /// `(skipped so far, files initially in source)`, set for skips.
    pub skip_tally: Option<(usize, usize)>,
}

/// Counters owned by the engine thread for the lifetime of one run.
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    pub total_in_source: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub attempted: usize,
    pub bytes_total: u64,
    pub bytes_processed: u64,
}

/// Progress snapshot emitted after each file attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub operation: Operation,
    pub current_file: String,
    pub processed: usize,
    pub attempted: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub total_in_source: usize,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub percent: f64,
    pub instant_mb_per_sec: f64,
    pub average_mb_per_sec: f64,
    pub files_per_minute: f64,
    pub eta: Duration,
}

impl TransferProgress {
    pub fn measure(
        operation: Operation,
        current_file: &str,
        counters: &RunCounters,
        file_bytes: u64,
        file_elapsed: Duration,
        total_elapsed: Duration,
    ) -> Self {
        let file_secs = file_elapsed.as_secs_f64();
        let total_secs = total_elapsed.as_secs_f64();

        let percent = if counters.eligible == 0 {
            100.0
        } else {
            counters.processed as f64 / counters.eligible as f64 * 100.0
        };
        let instant_mb_per_sec = if file_secs > 0.0 {
            file_bytes as f64 / MIB / file_secs
        } else {
            0.0
        };
        let average_mb_per_sec = if total_secs > 0.0 {
            counters.bytes_processed as f64 / MIB / total_secs
        } else {
            0.0
        };
        let files_per_minute = if total_secs > 0.0 {
            counters.processed as f64 / total_secs * 60.0
        } else {
            0.0
        };
        let remaining = counters.eligible.saturating_sub(counters.processed);
        let eta = if counters.processed > 0 {
            Duration::from_secs_f64(remaining as f64 * total_secs / counters.processed as f64)
        } else {
            Duration::ZERO
        };

        Self {
            operation,
            current_file: current_file.to_string(),
            processed: counters.processed,
            attempted: counters.attempted,
            eligible: counters.eligible,
            skipped: counters.skipped,
            total_in_source: counters.total_in_source,
            bytes_processed: counters.bytes_processed,
            bytes_total: counters.bytes_total,
            percent,
            instant_mb_per_sec,
            average_mb_per_sec,
            files_per_minute,
            eta,
        }
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Skipped: {}/{} files | {} {}/{} files ({}/{}) @ {:.2} MB/s | ETA: {} | Avg: {:.2} MB/s | FPM: {:.2}",
            self.skipped,
            self.total_in_source,
            self.operation.as_str().to_uppercase(),
            self.processed,
            self.eligible,
            format_bytes(self.bytes_processed),
            format_bytes(self.bytes_total),
            self.instant_mb_per_sec,
            format_eta(self.eta),
            self.average_mb_per_sec,
            self.files_per_minute,
        )
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if value < MIB {
        format!("{:.2} KB", value / 1024.0)
    } else if value < MIB * 1024.0 {
        format!("{:.2} MB", value / MIB)
    } else {
        format!("{:.2} GB", value / (MIB * 1024.0))
    }
}

pub fn format_eta(eta: Duration) -> String {
    let total = eta.as_secs();
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}
