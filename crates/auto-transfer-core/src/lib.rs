pub mod action_log;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod platform;
pub mod progress;
pub mod scheduler;
pub mod settings;
pub mod ticker;
pub mod transfer;

pub use action_log::ActionLog;
pub use config::AppConfig;
pub use coordinator::{RunCoordinator, RunHandle, RunState, RunStatus, StartError};
pub use error::{AbortReason, Error, ScheduleError};
pub use history::{JsonRunHistory, MemoryRunHistory, RunHistoryStore};
pub use progress::{ProgressReporter, ReporterSet, SilentReporter, TransferProgress};
pub use scheduler::{evaluate, evaluate_settings, Evaluation, ScheduleConfig};
pub use settings::{MemorySettings, SettingsStore, TomlSettingsStore};
pub use ticker::{TickOutcome, Ticker, TickerHandle};
pub use transfer::{CancelToken, Operation, Outcome, RunSummary, TransferEngine, TransferSettings};
