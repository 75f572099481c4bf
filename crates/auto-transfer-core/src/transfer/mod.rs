pub mod engine;
pub mod filter;
pub mod fs_ops;

pub use engine::TransferEngine;
pub use filter::{Eligibility, SkipReason};
pub use fs_ops::{FileOps, LocalFs};

use crate::error::AbortReason;
use crate::settings::{keys, value_to_bool, value_to_f64, value_to_i64, value_to_string, SettingsStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Move,
    Copy,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
        }
    }

    pub fn needs_destination(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" => Ok(Operation::Move),
            "copy" => Ok(Operation::Copy),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTypeFilter {
    All,
    ExcelLike,
}

pub const EXCEL_EXTENSIONS: [&str; 4] = ["xls", "xlsx", "xlsm", "csv"];

impl FileTypeFilter {
    /// "Excel" selects spreadsheet files; anything else means all files.
    pub fn from_setting(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("excel") {
            FileTypeFilter::ExcelLike
        } else {
            FileTypeFilter::All
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            FileTypeFilter::All => true,
            FileTypeFilter::ExcelLike => file_name
                .rsplit_once('.')
                .map(|(_, ext)| {
                    EXCEL_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for FileTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTypeFilter::All => f.write_str("All"),
            FileTypeFilter::ExcelLike => f.write_str("Excel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub file_type: FileTypeFilter,
    pub age_filter_enabled: bool,
    pub min_age_months: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            file_type: FileTypeFilter::All,
            age_filter_enabled: false,
            min_age_months: 3,
        }
    }
}

/// Everything a run needs from the settings store, read once at run start.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSettings {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub filter: FilterConfig,
    pub min_free_space_gb: f64,
}

impl TransferSettings {
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, AbortReason> {
        let source = PathBuf::from(value_to_string(&store.get_or_default(keys::SOURCE)));
        let destination = PathBuf::from(value_to_string(&store.get_or_default(keys::DEST)));
        let file_type =
            FileTypeFilter::from_setting(&value_to_string(&store.get_or_default(keys::FILE_TYPE)));

        let age_filter_enabled = value_to_bool(&store.get_or_default(keys::FILTER_OLD))
            .map_err(|v| AbortReason::Settings(format!("filter_old '{}' is not a boolean", v)))?;
        let min_age_months = value_to_i64(&store.get_or_default(keys::MONTHS_OLD))
            .ok()
            .and_then(|m| u32::try_from(m).ok())
            .ok_or_else(|| {
                AbortReason::Settings(format!(
                    "months_old '{}' is not a non-negative integer",
                    value_to_string(&store.get_or_default(keys::MONTHS_OLD))
                ))
            })?;
        let min_free_space_gb = value_to_f64(&store.get_or_default(keys::MIN_FREE_SPACE_GB))
            .map_err(|v| AbortReason::Settings(format!("min_free_space_gb '{}' is not a number", v)))?;

        Ok(Self {
            source,
            destination,
            filter: FilterConfig {
                file_type,
                age_filter_enabled,
                min_age_months,
            },
            min_free_space_gb,
        })
    }
}

/// A file that passed every filter and will be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub source_path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// Shared cancel flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-file result that does not stop the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileResult {
    Done,
    VerifyFailed,
    CancelledAfterCopy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub operation: Operation,
    pub total_in_source: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub bytes_processed: u64,
    /// `None` when the source could not be listed after the run.
    pub remaining_in_source: Option<usize>,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let remaining = self
            .remaining_in_source
            .map(|r| r.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        write!(
            f,
            "Processed {} files. Skipped {}/{} files. Failed verification: {}. Remaining in source: {} files.",
            self.processed, self.skipped, self.total_in_source, self.failed, remaining
        )
    }
}

/// Terminal state of one run.
#[derive(Debug)]
pub enum Outcome {
    Completed(RunSummary),
    Cancelled(RunSummary),
    Failed(AbortReason),
}

impl Outcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Outcome::Completed(summary) | Outcome::Cancelled(summary) => Some(summary),
            Outcome::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed(summary) => {
                write!(f, "{} operation complete. {}", capitalize(summary.operation.as_str()), summary)
            }
            Outcome::Cancelled(summary) => {
                write!(f, "{} operation cancelled. {}", capitalize(summary.operation.as_str()), summary)
            }
            Outcome::Failed(reason) => write!(f, "Critical error: {}", reason),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn test_operation_parse_and_display() {
        assert_eq!("MOVE".parse::<Operation>(), Ok(Operation::Move));
        assert_eq!(" copy ".parse::<Operation>(), Ok(Operation::Copy));
        assert_eq!("delete".parse::<Operation>(), Ok(Operation::Delete));
        assert!("rename".parse::<Operation>().is_err());
        assert_eq!(Operation::Copy.to_string(), "copy");
        assert!(!Operation::Delete.needs_destination());
    }

    #[test]
    fn test_excel_filter_is_case_insensitive() {
        let filter = FileTypeFilter::ExcelLike;
        assert!(filter.matches("report.XLSX"));
        assert!(filter.matches("data.csv"));
        assert!(filter.matches("macro.xlsm"));
        assert!(!filter.matches("notes.txt"));
        assert!(!filter.matches("xlsx"));
        assert!(FileTypeFilter::All.matches("anything"));
    }

    #[test]
    fn test_file_type_setting() {
        assert_eq!(FileTypeFilter::from_setting("Excel"), FileTypeFilter::ExcelLike);
        assert_eq!(FileTypeFilter::from_setting("All"), FileTypeFilter::All);
        assert_eq!(FileTypeFilter::from_setting("pdf"), FileTypeFilter::All);
    }

    #[test]
    fn test_transfer_settings_from_store() {
        let store = MemorySettings::new()
            .with(keys::SOURCE, "/in")
            .with(keys::DEST, "/out")
            .with(keys::FILE_TYPE, "Excel")
            .with(keys::FILTER_OLD, "True")
            .with(keys::MONTHS_OLD, "6");
        let settings = TransferSettings::from_store(&store).unwrap();
        assert_eq!(settings.source, PathBuf::from("/in"));
        assert_eq!(settings.destination, PathBuf::from("/out"));
        assert_eq!(settings.filter.file_type, FileTypeFilter::ExcelLike);
        assert!(settings.filter.age_filter_enabled);
        assert_eq!(settings.filter.min_age_months, 6);
        assert_eq!(settings.min_free_space_gb, 5.0);
    }

    #[test]
    fn test_transfer_settings_rejects_negative_age() {
        let store = MemorySettings::new().with(keys::MONTHS_OLD, -1);
        assert!(matches!(
            TransferSettings::from_store(&store),
            Err(AbortReason::Settings(_))
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_outcome_messages() {
        let summary = RunSummary {
            operation: Operation::Move,
            total_in_source: 5,
            eligible: 2,
            skipped: 3,
            processed: 2,
            failed: 0,
            bytes_processed: 10,
            remaining_in_source: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(
            Outcome::Completed(summary).to_string(),
            "Move operation complete. Processed 2 files. Skipped 3/5 files. Failed verification: 0. Remaining in source: N/A files."
        );
        let failed = Outcome::Failed(AbortReason::SourceMissing(PathBuf::from("/gone")));
        assert_eq!(failed.to_string(), "Critical error: Source folder not found: /gone");
    }
}
