//! Flat key-value store for operator settings.
//!
//! Values are kept as TOML values. The legacy UI wrote every field as a
//! string, so the typed readers below accept both native values and their
//! string spellings.

use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use toml::{Table, Value};
use tracing::{debug, error};

pub mod keys {
    pub const SOURCE: &str = "source";
    pub const DEST: &str = "dest";
    pub const FILE_TYPE: &str = "file_type";
    pub const AUTO_DAY: &str = "auto_day";
    pub const AUTO_INTERVAL: &str = "auto_interval";
    pub const AUTO_OPERATION: &str = "auto_operation";
    pub const AUTO_TIME: &str = "auto_time";
    pub const MIN_FREE_SPACE_GB: &str = "min_free_space_gb";
    pub const FILTER_OLD: &str = "filter_old";
    pub const MONTHS_OLD: &str = "months_old";

    pub const ALL: [&str; 10] = [
        SOURCE,
        DEST,
        FILE_TYPE,
        AUTO_DAY,
        AUTO_INTERVAL,
        AUTO_OPERATION,
        AUTO_TIME,
        MIN_FREE_SPACE_GB,
        FILTER_OLD,
        MONTHS_OLD,
    ];
}

/// Default value for a known key, matching what a fresh install starts with.
pub fn default_value(key: &str) -> Option<Value> {
    let value = match key {
        keys::SOURCE | keys::DEST => Value::String(String::new()),
        keys::FILE_TYPE => Value::String("All".to_string()),
        keys::AUTO_DAY => Value::Integer(1),
        keys::AUTO_INTERVAL => Value::Integer(1),
        keys::AUTO_OPERATION => Value::String("move".to_string()),
        keys::AUTO_TIME => Value::String("00:01".to_string()),
        keys::MIN_FREE_SPACE_GB => Value::Float(5.0),
        keys::FILTER_OLD => Value::Boolean(false),
        keys::MONTHS_OLD => Value::Integer(3),
        _ => return None,
    };
    Some(value)
}

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<(), Error>;

    /// Snapshot of every stored entry.
    fn entries(&self) -> Table;

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Stored value, falling back to the key's built-in default.
    fn get_or_default(&self, key: &str) -> Value {
        self.get(key)
            .or_else(|| default_value(key))
            .unwrap_or_else(|| Value::String(String::new()))
    }
}

/// Render a value the way an operator typed it: strings without quotes.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn value_to_i64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}

pub fn value_to_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}

pub fn value_to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Integer(i) => Ok(*i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(s.clone()),
        },
        other => Err(other.to_string()),
    }
}

/// Parse command-line text into the most specific TOML value it spells.
pub fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(raw.to_string())
}

/// Settings persisted as a flat TOML table. The file is re-read on every
/// lookup so edits made by another process are picked up by a running
/// daemon.
pub struct TomlSettingsStore {
    path: PathBuf,
    cache: Mutex<Table>,
}

impl TomlSettingsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let table = read_table(&path)?;
        debug!("Loaded {} settings from {}", table.len(), path.display());
        Ok(Self {
            path,
            cache: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Table {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match read_table(&self.path) {
            Ok(table) => *cache = table,
            Err(e) => error!(
                "Error reading settings file {}: {}. Using last known settings.",
                self.path.display(),
                e
            ),
        }
        cache.clone()
    }
}

fn read_table(path: &Path) -> Result<Table, Error> {
    if !path.exists() {
        return Ok(Table::new());
    }
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str::<Table>(&contents)?)
}

impl SettingsStore for TomlSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.current().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        let mut table = self.current();
        table.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, toml::to_string_pretty(&table)?)?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = table;
        Ok(())
    }

    fn entries(&self) -> Table {
        self.current()
    }
}

#[derive(Default)]
pub struct MemorySettings {
    table: Mutex<Table>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.into());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }

    fn entries(&self) -> Table {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
