//! Single-flight run coordination.
//!
//! The coordinator owns the "a run is active" flag, the cancel token and the
//! latest progress snapshot. Runs execute on their own thread. The flag is
//! claimed with a compare-and-swap and released by a drop guard on the worker
//! thread, so it is released even if the run panics.

use crate::error::AbortReason;
use crate::history::RunHistoryStore;
use crate::platform::{DiskSpace, SpaceProbe};
use crate::progress::{ProgressReporter, ReporterSet, RunPlan, TransferProgress};
use crate::settings::SettingsStore;
use crate::transfer::{
    CancelToken, FileOps, LocalFs, Operation, Outcome, TransferEngine, TransferSettings,
};
use chrono::{Local, NaiveDate};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum StartError {
    #[error("A task is already in progress")]
    AlreadyRunning,

    #[error("Failed to spawn run thread: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed(String),
}

/// Read-only view of the coordinator for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatus {
    pub state: RunState,
    pub operation: Option<Operation>,
    pub progress: Option<TransferProgress>,
    pub message: String,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            operation: None,
            progress: None,
            message: String::new(),
        }
    }
}

/// Keeps the coordinator's snapshot current from engine events.
struct StatusTracker {
    status: Arc<Mutex<RunStatus>>,
}

impl StatusTracker {
    fn update(&self, apply: impl FnOnce(&mut RunStatus)) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut status);
    }
}

impl ProgressReporter for StatusTracker {
    fn on_run_start(&self, plan: &RunPlan) {
        self.update(|s| {
            s.message = format!(
                "{} {} eligible files ({} skipped)",
                plan.operation, plan.eligible, plan.skipped
            )
        });
    }

    fn on_file_progress(&self, progress: &TransferProgress) {
        let progress = progress.clone();
        self.update(|s| {
            s.message = progress.to_string();
            s.progress = Some(progress);
        });
    }

    fn on_run_complete(&self, outcome: &Outcome) {
        self.update(|s| {
            s.state = match outcome {
                Outcome::Completed(_) => RunState::Completed,
                Outcome::Cancelled(_) => RunState::Cancelled,
                Outcome::Failed(reason) => RunState::Failed(reason.to_string()),
            };
            s.message = outcome.to_string();
        });
    }
}

/// Clears the running flag when the worker thread ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct RunHandle {
    join: JoinHandle<Outcome>,
}

impl RunHandle {
    /// Block until the run ends.
    pub fn wait(self) -> Outcome {
        self.join.join().unwrap_or_else(|payload| {
            Outcome::Failed(AbortReason::Unexpected(panic_message(payload.as_ref())))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub struct RunCoordinator {
    settings: Arc<dyn SettingsStore>,
    history: Arc<dyn RunHistoryStore>,
    reporter: Arc<dyn ProgressReporter>,
    file_ops: Arc<dyn FileOps>,
    space_probe: Arc<dyn SpaceProbe>,
    running: Arc<AtomicBool>,
    cancel_token: CancelToken,
    status: Arc<Mutex<RunStatus>>,
}

impl RunCoordinator {
    pub fn new(settings: Arc<dyn SettingsStore>, history: Arc<dyn RunHistoryStore>) -> Self {
        Self {
            settings,
            history,
            reporter: Arc::new(ReporterSet::new()),
            file_ops: Arc::new(LocalFs),
            space_probe: Arc::new(DiskSpace),
            running: Arc::new(AtomicBool::new(false)),
            cancel_token: CancelToken::new(),
            status: Arc::new(Mutex::new(RunStatus::default())),
        }
    }

    /// Observer for every run started by this coordinator.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_file_ops(mut self, file_ops: Arc<dyn FileOps>) -> Self {
        self.file_ops = file_ops;
        self
    }

    pub fn with_space_probe(mut self, space_probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = space_probe;
        self
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn history(&self) -> &Arc<dyn RunHistoryStore> {
        &self.history
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> RunStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Request cooperative cancellation of the active run. No-op when idle.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Cancellation requested");
            self.cancel_token.cancel();
        }
    }

    pub fn start(&self, operation: Operation) -> Result<RunHandle, StartError> {
        self.start_on(operation, Local::now().date_naive())
    }

    /// Start a run, recording `today` as the last run date. Rejected without
    /// side effects while another run is active.
    pub fn start_on(&self, operation: Operation, today: NaiveDate) -> Result<RunHandle, StartError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("A task is already in progress. Ignoring {} request.", operation);
            return Err(StartError::AlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());

        self.cancel_token.reset();
        {
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            *status = RunStatus {
                state: RunState::Running,
                operation: Some(operation),
                progress: None,
                message: format!("Starting {}", operation),
            };
        }

        if let Err(e) = self.history.set(today) {
            error!("Failed to record last run date {}: {}", today, e);
        }

        let settings = self.settings.clone();
        let file_ops = self.file_ops.clone();
        let space_probe = self.space_probe.clone();
        let cancel_token = self.cancel_token.clone();
        let reporters = ReporterSet::new()
            .with(Arc::new(StatusTracker {
                status: self.status.clone(),
            }))
            .with(self.reporter.clone());

        let spawned = thread::Builder::new()
            .name(format!("auto-transfer-{}", operation))
            .spawn(move || {
                let _guard = guard;
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    match TransferSettings::from_store(settings.as_ref()) {
                        Ok(transfer_settings) => TransferEngine::new(transfer_settings)
                            .with_file_ops(file_ops)
                            .with_space_probe(space_probe)
                            .with_cancel_token(cancel_token)
                            .execute(operation, &reporters),
                        Err(reason) => {
                            error!("Cannot start {}: {}", operation, reason);
                            let outcome = Outcome::Failed(reason);
                            reporters.on_run_complete(&outcome);
                            outcome
                        }
                    }
                }));
                result.unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!("Run panicked: {}", message);
                    let outcome = Outcome::Failed(AbortReason::Unexpected(message));
                    reporters.on_run_complete(&outcome);
                    outcome
                })
            });

        match spawned {
            Ok(join) => Ok(RunHandle { join }),
            Err(e) => {
                error!("Failed to start {}: {}", operation, e);
                let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
                status.state = RunState::Failed(e.to_string());
                Err(StartError::Spawn(e))
            }
        }
    }

    /// Start a run and wait for its outcome.
    pub fn run_blocking(&self, operation: Operation) -> Result<Outcome, StartError> {
        Ok(self.start(operation)?.wait())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
