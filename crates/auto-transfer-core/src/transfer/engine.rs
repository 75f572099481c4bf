use super::filter::{self, Eligibility, SkipReason};
use super::fs_ops::{self, FileOps, LocalFs};
use super::{CancelToken, FileRecord, FileResult, Operation, Outcome, RunSummary, TransferSettings};
use crate::error::AbortReason;
use crate::platform::{DiskSpace, SpaceProbe};
use crate::progress::{
    ActionKind, ActionStatus, FileAction, ProgressReporter, RunCounters, RunPlan, TransferProgress,
};
use chrono::Local;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct TransferEngine {
    settings: TransferSettings,
    file_ops: Arc<dyn FileOps>,
    space_probe: Arc<dyn SpaceProbe>,
    cancel_token: CancelToken,
}

impl TransferEngine {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            settings,
            file_ops: Arc::new(LocalFs),
            space_probe: Arc::new(DiskSpace),
            cancel_token: CancelToken::new(),
        }
    }

    pub fn with_file_ops(mut self, file_ops: Arc<dyn FileOps>) -> Self {
        self.file_ops = file_ops;
        self
    }

    pub fn with_space_probe(mut self, space_probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = space_probe;
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: CancelToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Run one operation to completion:
    /// 1. Pre-flight checks on source, destination and free space
    /// 2. Non-recursive listing of regular files in the source
    /// 3. Type and age filtering, then oldest-first ordering
    /// 4. Per-file execution with cancellation checks between files
    ///
    /// Never returns an error; critical conditions become `Outcome::Failed`.
    pub fn execute(&self, operation: Operation, reporter: &dyn ProgressReporter) -> Outcome {
        let outcome = match self.run(operation, reporter) {
            Ok(outcome) => outcome,
            Err(reason) => {
                error!("Critical error during {}: {}", operation, reason);
                Outcome::Failed(reason)
            }
        };
        info!("{}", outcome);
        reporter.on_run_complete(&outcome);
        outcome
    }

    fn run(
        &self,
        operation: Operation,
        reporter: &dyn ProgressReporter,
    ) -> Result<Outcome, AbortReason> {
        let run_start = Instant::now();
        let source = &self.settings.source;
        info!(
            "Beginning {} from '{}' to '{}' (File type: {})",
            operation,
            source.display(),
            self.settings.destination.display(),
            self.settings.filter.file_type
        );

        self.preflight(operation)?;

        // Phase 1: List
        let listing = list_regular_files(source)
            .map_err(|e| AbortReason::io(format!("listing '{}'", source.display()), e))?;
        let mut counters = RunCounters {
            total_in_source: listing.len(),
            ..RunCounters::default()
        };
        debug!("{} files found in source", counters.total_in_source);

        // Phase 2: Filter
        let cutoff = filter::age_cutoff(Local::now(), &self.settings.filter);
        let mut eligible: Vec<FileRecord> = Vec::new();
        for path in &listing {
            match filter::check_file(path, &self.settings.filter, cutoff)? {
                Eligibility::Include(record) => eligible.push(record),
                Eligibility::Skip(reason) => {
                    counters.skipped += 1;
                    let status = match reason {
                        SkipReason::WrongFileType => ActionStatus::WrongFileType,
                        SkipReason::NotOldEnough { modified } => {
                            ActionStatus::NotOldEnough { modified }
                        }
                    };
                    debug!("Skipping '{}': {}", path.display(), status);
                    reporter.on_file_action(&FileAction {
                        kind: ActionKind::Skip,
                        file_name: file_name_of(path),
                        status,
                        source: path.clone(),
                        destination: None,
                        skip_tally: Some((counters.skipped, counters.total_in_source)),
                    });
                }
            }
        }

        // Phase 3: Order oldest first, name breaks ties
        eligible.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.name.cmp(&b.name))
        });
        counters.eligible = eligible.len();
        counters.bytes_total = eligible.iter().map(|r| r.size_bytes).sum();
        info!(
            "{} files eligible, {} skipped of {} in source",
            counters.eligible, counters.skipped, counters.total_in_source
        );

        reporter.on_run_start(&RunPlan {
            operation,
            source: source.clone(),
            destination: operation
                .needs_destination()
                .then(|| self.settings.destination.clone()),
            total_in_source: counters.total_in_source,
            eligible: counters.eligible,
            skipped: counters.skipped,
            bytes_total: counters.bytes_total,
        });

        // Phase 4: Execute
        for record in &eligible {
            if self.cancel_token.is_cancelled() {
                info!("Operation cancelled by user. Stopping file processing.");
                break;
            }

            let file_start = Instant::now();
            counters.attempted += 1;
            let (result, file_bytes) = match self.process_file(operation, record, reporter) {
                Ok(done) => done,
                Err(reason) => {
                    reporter.on_file_action(&FileAction {
                        kind: operation.into(),
                        file_name: record.name.clone(),
                        status: ActionStatus::DriveError(reason.to_string()),
                        source: record.source_path.clone(),
                        destination: None,
                        skip_tally: None,
                    });
                    return Err(reason);
                }
            };

            match result {
                FileResult::Done => {
                    counters.processed += 1;
                    counters.bytes_processed += file_bytes;
                }
                FileResult::VerifyFailed => counters.failed += 1,
                FileResult::CancelledAfterCopy => {}
            }

            let progress = TransferProgress::measure(
                operation,
                &record.name,
                &counters,
                file_bytes,
                file_start.elapsed(),
                run_start.elapsed(),
            );
            debug!("{}", progress);
            reporter.on_file_progress(&progress);
        }

        let remaining_in_source = match list_regular_files(source) {
            Ok(files) => Some(files.len()),
            Err(e) => {
                warn!("Could not count files left in '{}': {}", source.display(), e);
                None
            }
        };

        let summary = RunSummary {
            operation,
            total_in_source: counters.total_in_source,
            eligible: counters.eligible,
            skipped: counters.skipped,
            processed: counters.processed,
            failed: counters.failed,
            bytes_processed: counters.bytes_processed,
            remaining_in_source,
            elapsed: run_start.elapsed(),
        };

        if self.cancel_token.is_cancelled() {
            Ok(Outcome::Cancelled(summary))
        } else {
            Ok(Outcome::Completed(summary))
        }
    }

    fn preflight(&self, operation: Operation) -> Result<(), AbortReason> {
        let source = &self.settings.source;
        if !is_existing_dir(source)? {
            return Err(AbortReason::SourceMissing(source.clone()));
        }

        if !operation.needs_destination() {
            return Ok(());
        }

        let destination = &self.settings.destination;
        if !is_existing_dir(destination)? {
            return Err(AbortReason::DestinationMissing(destination.clone()));
        }

        let free_gb = self.space_probe.available_gb(destination).map_err(|e| {
            AbortReason::io(
                format!("checking free space on '{}'", destination.display()),
                e,
            )
        })?;
        if free_gb < self.settings.min_free_space_gb {
            return Err(AbortReason::InsufficientSpace {
                free_gb,
                required_gb: self.settings.min_free_space_gb,
            });
        }
        debug!(
            "Destination has {:.2} GB free (minimum {} GB)",
            free_gb, self.settings.min_free_space_gb
        );
        Ok(())
    }

    /// Returns the per-file result and the byte count it accounts for.
    fn process_file(
        &self,
        operation: Operation,
        record: &FileRecord,
        reporter: &dyn ProgressReporter,
    ) -> Result<(FileResult, u64), AbortReason> {
        let source_path = &record.source_path;
        let size = self
            .file_ops
            .file_size(source_path)
            .map_err(|e| AbortReason::io(format!("reading '{}'", source_path.display()), e))?
            .ok_or_else(|| AbortReason::FileVanished(source_path.clone()))?;

        let action = |status: ActionStatus, destination: Option<PathBuf>| FileAction {
            kind: operation.into(),
            file_name: record.name.clone(),
            status,
            source: source_path.clone(),
            destination,
            skip_tally: None,
        };

        if operation == Operation::Delete {
            self.file_ops.remove_file(source_path).map_err(|e| {
                AbortReason::io(format!("deleting '{}'", source_path.display()), e)
            })?;
            debug!("Deleted '{}'", source_path.display());
            reporter.on_file_action(&action(ActionStatus::Success, None));
            return Ok((FileResult::Done, size));
        }

        let target = fs_ops::unique_destination(&self.settings.destination, &record.name)
            .map_err(|e| {
                AbortReason::io(
                    format!("checking '{}' in destination", record.name),
                    e,
                )
            })?;
        if target.file_name() != Some(OsStr::new(&record.name)) {
            debug!(
                "'{}' already exists in destination. Renaming to '{}'.",
                record.name,
                target.display()
            );
        }

        self.file_ops
            .copy_with_metadata(source_path, &target)
            .map_err(|e| {
                AbortReason::io(
                    format!(
                        "copying '{}' to '{}'",
                        source_path.display(),
                        target.display()
                    ),
                    e,
                )
            })?;

        if operation == Operation::Copy {
            debug!("Copied '{}' to '{}'", source_path.display(), target.display());
            reporter.on_file_action(&action(ActionStatus::Success, Some(target)));
            return Ok((FileResult::Done, size));
        }

        debug!("[Move 1/2] Copied '{}' to '{}'", source_path.display(), target.display());
        if !self.copy_verified(source_path, &target)? {
            error!(
                "Verification failed for '{}': size mismatch. Source kept.",
                source_path.display()
            );
            reporter.on_file_action(&action(ActionStatus::FailedSizeMismatch, Some(target)));
            return Ok((FileResult::VerifyFailed, 0));
        }

        if self.cancel_token.is_cancelled() {
            warn!(
                "Cancelled after copying '{}'. Source not deleted.",
                source_path.display()
            );
            reporter.on_file_action(&action(ActionStatus::CancelledAfterCopy, Some(target)));
            return Ok((FileResult::CancelledAfterCopy, 0));
        }

        self.file_ops.remove_file(source_path).map_err(|e| {
            AbortReason::io(format!("deleting '{}' after copy", source_path.display()), e)
        })?;
        debug!("[Move 2/2] Removed '{}'", source_path.display());
        reporter.on_file_action(&action(ActionStatus::Success, Some(target)));
        Ok((FileResult::Done, size))
    }

    fn copy_verified(&self, source: &Path, target: &Path) -> Result<bool, AbortReason> {
        let source_size = self
            .file_ops
            .file_size(source)
            .map_err(|e| AbortReason::io(format!("verifying '{}'", source.display()), e))?
            .ok_or_else(|| AbortReason::FileVanished(source.to_path_buf()))?;
        let target_size = self
            .file_ops
            .file_size(target)
            .map_err(|e| AbortReason::io(format!("verifying '{}'", target.display()), e))?;
        Ok(target_size == Some(source_size))
    }
}

fn is_existing_dir(path: &Path) -> Result<bool, AbortReason> {
    match fs::metadata(path) {
        Ok(m) => Ok(m.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AbortReason::io(
            format!("checking '{}'", path.display()),
            e,
        )),
    }
}

/// Regular files directly inside `dir`. Subdirectories are neither listed
/// nor descended into.
pub fn list_regular_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
