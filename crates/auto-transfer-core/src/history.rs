use crate::error::Error;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persists the date of the most recent run start.
pub trait RunHistoryStore: Send + Sync {
    fn get(&self) -> Option<NaiveDate>;

    fn set(&self, date: NaiveDate) -> Result<(), Error>;

    /// Record `today` when nothing has been recorded yet. Returns whether the
    /// history was written.
    fn initialize_if_missing(&self, today: NaiveDate) -> Result<bool, Error> {
        if self.get().is_some() {
            return Ok(false);
        }
        self.set(today)?;
        Ok(true)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LastRunRecord {
    #[serde(default)]
    last_run: String,
}

/// `{"last_run": "YYYY-MM-DD"}` on disk.
pub struct JsonRunHistory {
    path: PathBuf,
}

impl JsonRunHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Result<Option<LastRunRecord>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

impl RunHistoryStore for JsonRunHistory {
    fn get(&self) -> Option<NaiveDate> {
        let record = match self.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                error!(
                    "Error reading last run file {}: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        if record.last_run.trim().is_empty() {
            return None;
        }
        match NaiveDate::parse_from_str(record.last_run.trim(), DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(e) => {
                error!(
                    "Invalid last run date '{}' in {}: {}. Ignoring it.",
                    record.last_run,
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn set(&self, date: NaiveDate) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let record = LastRunRecord {
            last_run: date.format(DATE_FORMAT).to_string(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        info!("Last run date recorded as {}", record.last_run);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunHistory {
    last_run: Mutex<Option<NaiveDate>>,
}

impl MemoryRunHistory {
    pub fn new(last_run: Option<NaiveDate>) -> Self {
        Self {
            last_run: Mutex::new(last_run),
        }
    }
}

impl RunHistoryStore for MemoryRunHistory {
    fn get(&self) -> Option<NaiveDate> {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, date: NaiveDate) -> Result<(), Error> {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(date);
        Ok(())
    }
}
