use crate::coordinator::{RunCoordinator, RunHandle, StartError};
use crate::error::Error;
use crate::scheduler::{self, Evaluation, ScheduleConfig};
use crate::transfer::Operation;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

pub const BUSY_STATUS: &str = "A task is in progress";

#[derive(Debug)]
pub enum TickOutcome {
    /// A run was already active; the scheduler was not consulted.
    Busy,
    NotDue(Evaluation),
    Started {
        operation: Operation,
        handle: RunHandle,
    },
    StartFailed(String),
}

/// Wakes on a fixed interval and starts the scheduled operation when due.
pub struct Ticker {
    coordinator: Arc<RunCoordinator>,
}

impl Ticker {
    pub fn new(coordinator: Arc<RunCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Give a fresh install a last-run date of today, so a slot that already
    /// passed this month does not fire on first start.
    pub fn bootstrap_history(&self, today: NaiveDate) -> Result<bool, Error> {
        let written = self.coordinator.history().initialize_if_missing(today)?;
        if written {
            info!("No run history found. Initialized last run date to {}.", today);
        }
        Ok(written)
    }

    /// Current schedule status line, or [`BUSY_STATUS`] while a run is
    /// active.
    pub fn status_line(&self, now: NaiveDateTime) -> String {
        if self.coordinator.is_running() {
            return BUSY_STATUS.to_string();
        }
        scheduler::evaluate_settings(
            now,
            self.coordinator.settings().as_ref(),
            self.coordinator.history().get(),
        )
        .summary
    }

    pub fn tick(&self, now: NaiveDateTime) -> TickOutcome {
        if self.coordinator.is_running() {
            debug!("{}. Skipping schedule check.", BUSY_STATUS);
            return TickOutcome::Busy;
        }

        let settings = self.coordinator.settings().as_ref();
        let last_run = self.coordinator.history().get();
        let config = match ScheduleConfig::from_store(settings) {
            Ok(config) => config,
            Err(_) => {
                return TickOutcome::NotDue(scheduler::evaluate_settings(now, settings, last_run))
            }
        };

        let evaluation = scheduler::evaluate(now, &config, last_run);
        if !evaluation.due_now {
            debug!("Not due. {}", evaluation.summary);
            return TickOutcome::NotDue(evaluation);
        }

        info!(
            "Scheduled {} is due ({}). Starting.",
            config.operation, evaluation.summary
        );
        match self.coordinator.start_on(config.operation, now.date()) {
            Ok(handle) => TickOutcome::Started {
                operation: config.operation,
                handle,
            },
            Err(StartError::AlreadyRunning) => TickOutcome::Busy,
            Err(e) => {
                error!("Failed to start scheduled {}: {}", config.operation, e);
                TickOutcome::StartFailed(e.to_string())
            }
        }
    }

    /// Run the tick loop on its own thread: first tick after `startup_delay`,
    /// then every `interval` until stopped.
    pub fn spawn(self, startup_delay: Duration, interval: Duration) -> io::Result<TickerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("auto-transfer-ticker".to_string())
            .spawn(move || {
                let mut wait = startup_delay;
                loop {
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    wait = interval;

                    let now = Local::now().naive_local();
                    let result = panic::catch_unwind(AssertUnwindSafe(|| self.tick(now)));
                    match result {
                        Ok(TickOutcome::Started { operation, .. }) => {
                            debug!("Scheduled {} running in background", operation)
                        }
                        Ok(_) => {}
                        Err(_) => error!("Schedule check panicked. Continuing."),
                    }
                }
                info!("Ticker stopped");
            })?;

        Ok(TickerHandle { stop_tx, join })
    }
}

pub struct TickerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

impl TickerHandle {
    /// Stop ticking and wait for the loop to exit. An active run is left to
    /// the coordinator.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.join.join().is_err() {
            error!("Ticker thread panicked");
        }
    }
}
