use crate::error::Error;
use crate::progress::{FileAction, ProgressReporter};
use crate::transfer::Outcome;
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::error;

#[derive(Debug, Serialize)]
struct ActionRow<'a> {
    timestamp: String,
    action: String,
    file: &'a str,
    status: String,
    source: String,
    destination: String,
}

/// Appends one CSV row per file action, recording the source and destination
/// folders. The header is written once, when the file is first created.
pub struct ActionLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl ActionLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, action: &FileAction) -> Result<(), Error> {
        let mut status = action.status.to_string();
        if let Some((skipped, total)) = action.skip_tally {
            status = format!("{}|Skipped:{}/{}", status, skipped, total);
        }
        let row = ActionRow {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            action: action.kind.to_string(),
            file: &action.file_name,
            status,
            source: parent_dir(Some(&action.source)),
            destination: parent_dir(action.destination.as_deref()),
        };

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}

fn parent_dir(path: Option<&Path>) -> String {
    path.and_then(Path::parent)
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

impl ProgressReporter for ActionLog {
    fn on_file_action(&self, action: &FileAction) {
        if let Err(e) = self.append(action) {
            error!(
                "Failed to write action log entry to {}: {}",
                self.path.display(),
                e
            );
        }
    }

    fn on_run_complete(&self, _outcome: &Outcome) {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writer.flush() {
            error!("Failed to flush action log {}: {}", self.path.display(), e);
        }
    }
}
