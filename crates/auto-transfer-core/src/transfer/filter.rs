use super::{FileRecord, FilterConfig};
use crate::error::AbortReason;
use chrono::{DateTime, Local, Months};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    WrongFileType,
    NotOldEnough { modified: SystemTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Include(FileRecord),
    Skip(SkipReason),
}

/// Files modified after this instant are too new. `None` disables the
/// age filter for the run.
pub fn age_cutoff(now: DateTime<Local>, filter: &FilterConfig) -> Option<SystemTime> {
    if !filter.age_filter_enabled {
        return None;
    }
    match now.checked_sub_months(Months::new(filter.min_age_months)) {
        Some(cutoff) => Some(cutoff.into()),
        None => {
            error!(
                "Could not compute a cutoff {} months before {}. Age filter disabled for this run.",
                filter.min_age_months, now
            );
            None
        }
    }
}

/// Classify one listed file. The type check runs on the name alone; the age
/// check needs metadata, and a file that is gone by then aborts the run.
pub fn check_file(
    path: &Path,
    filter: &FilterConfig,
    cutoff: Option<SystemTime>,
) -> Result<Eligibility, AbortReason> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !filter.file_type.matches(&name) {
        return Ok(Eligibility::Skip(SkipReason::WrongFileType));
    }

    let metadata = match fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(AbortReason::FileVanished(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(AbortReason::FileVanished(path.to_path_buf()))
        }
        Err(e) => {
            return Err(AbortReason::io(
                format!("reading metadata for '{}'", path.display()),
                e,
            ))
        }
    };
    let modified = metadata.modified().map_err(|e| {
        AbortReason::io(
            format!("reading modification time of '{}'", path.display()),
            e,
        )
    })?;

    if let Some(cutoff) = cutoff {
        if modified > cutoff {
            return Ok(Eligibility::Skip(SkipReason::NotOldEnough { modified }));
        }
    }

    Ok(Eligibility::Include(FileRecord {
        name,
        source_path: path.to_path_buf(),
        modified,
        size_bytes: metadata.len(),
    }))
}
