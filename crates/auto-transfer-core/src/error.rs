use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Settings file error: {0}")]
    SettingsFormat(#[from] toml::de::Error),

    #[error("Settings write error: {0}")]
    SettingsWrite(#[from] toml::ser::Error),

    #[error("Run history error: {0}")]
    History(#[from] serde_json::Error),

    #[error("Action log error: {0}")]
    ActionLog(#[from] csv::Error),
}

/// Malformed schedule configuration. Reported by the scheduler as a non-due
/// evaluation, never raised to the ticker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("day of month '{0}' is not an integer between 1 and 31")]
    InvalidDay(String),

    #[error("repeat interval '{0}' is not an integer")]
    InvalidInterval(String),

    #[error("time of day '{0}' is not a valid HH:MM value")]
    InvalidTime(String),

    #[error("operation '{0}' is not one of move, copy, delete")]
    InvalidOperation(String),

    #[error("minimum free space '{0}' is not a number")]
    InvalidFreeSpace(String),
}

/// Reasons that terminate a whole transfer run.
#[derive(Error, Debug)]
pub enum AbortReason {
    #[error("Source folder not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Destination folder not found: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error(
        "Free space on destination ({free_gb:.2} GB) is below minimum required ({required_gb} GB)"
    )]
    InsufficientSpace { free_gb: f64, required_gb: f64 },

    #[error("File '{}' disappeared from source during the run", .0.display())]
    FileVanished(PathBuf),

    #[error("Drive disconnected or file system error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid transfer settings: {0}")]
    Settings(String),

    #[error("Unexpected error during run: {0}")]
    Unexpected(String),
}

impl AbortReason {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        AbortReason::Io {
            context: context.into(),
            source,
        }
    }
}
