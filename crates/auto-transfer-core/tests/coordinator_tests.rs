use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use auto_transfer_core::platform::FixedSpace;
use auto_transfer_core::settings::keys;
use auto_transfer_core::transfer::{FileOps, LocalFs};
use auto_transfer_core::{
    MemoryRunHistory, MemorySettings, Operation, Outcome, RunCoordinator, RunHistoryStore,
    RunState, StartError, TickOutcome, Ticker,
};

/// Holds every copy until the test releases it.
struct GatedCopy {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GatedCopy {
    /// Returns the ops, a receiver signalled when a copy starts, and the
    /// sender that lets a copy finish. Dropping the sender opens the gate.
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let ops = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (ops, entered_rx, release_tx)
    }
}

impl FileOps for GatedCopy {
    fn copy_with_metadata(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        LocalFs.copy_with_metadata(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove_file(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        LocalFs.file_size(path)
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

fn folder_settings(source: &Path, destination: &Path) -> MemorySettings {
    MemorySettings::new()
        .with(keys::SOURCE, source.display().to_string())
        .with(keys::DEST, destination.display().to_string())
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), b"a").unwrap();
    fs::write(src.path().join("b.txt"), b"b").unwrap();

    let history = Arc::new(MemoryRunHistory::default());
    let (ops, entered, release) = GatedCopy::new();
    let coordinator = RunCoordinator::new(
        Arc::new(folder_settings(src.path(), dst.path())),
        history.clone(),
    )
    .with_file_ops(ops)
    .with_space_probe(Arc::new(FixedSpace::gb(50.0)));

    let handle = coordinator
        .start_on(Operation::Copy, date(2024, 5, 1))
        .unwrap();
    entered.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(coordinator.is_running());
    let before = coordinator.status();

    let second = coordinator.start_on(Operation::Delete, date(2024, 5, 2));
    assert!(matches!(second, Err(StartError::AlreadyRunning)));
    assert_eq!(history.get(), Some(date(2024, 5, 1)));
    assert_eq!(coordinator.status(), before);

    drop(release);
    let outcome = handle.wait();
    let summary = outcome.summary().cloned().unwrap();
    assert_eq!(summary.processed, 2);
    assert!(src.path().join("a.txt").exists());
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.status().state, RunState::Completed);
    assert_eq!(coordinator.status().progress.unwrap().processed, 2);
}

#[test]
fn test_cancel_stops_at_next_file_boundary() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), b"a").unwrap();
    fs::write(src.path().join("b.txt"), b"b").unwrap();

    let (ops, entered, release) = GatedCopy::new();
    let coordinator = RunCoordinator::new(
        Arc::new(folder_settings(src.path(), dst.path())),
        Arc::new(MemoryRunHistory::default()),
    )
    .with_file_ops(ops)
    .with_space_probe(Arc::new(FixedSpace::gb(50.0)));

    let handle = coordinator.start(Operation::Copy).unwrap();
    entered.recv_timeout(Duration::from_secs(10)).unwrap();
    coordinator.cancel();
    coordinator.cancel();
    drop(release);

    match handle.wait() {
        Outcome::Cancelled(summary) => assert_eq!(summary.processed, 1),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 1);
    assert_eq!(coordinator.status().state, RunState::Cancelled);

    // The next run starts with a fresh cancel flag.
    let outcome = coordinator.run_blocking(Operation::Copy).unwrap();
    assert!(outcome.is_success());
}

#[test]
fn test_ticker_skips_while_run_active() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), b"a").unwrap();

    let (ops, entered, release) = GatedCopy::new();
    let coordinator = Arc::new(
        RunCoordinator::new(
            Arc::new(folder_settings(src.path(), dst.path())),
            Arc::new(MemoryRunHistory::default()),
        )
        .with_file_ops(ops)
        .with_space_probe(Arc::new(FixedSpace::gb(50.0))),
    );
    let ticker = Ticker::new(coordinator.clone());

    let handle = coordinator.start(Operation::Copy).unwrap();
    entered.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(matches!(ticker.tick(at(2030, 1, 1, 12, 0)), TickOutcome::Busy));
    assert_eq!(ticker.status_line(at(2030, 1, 1, 12, 0)), "A task is in progress");

    drop(release);
    assert!(handle.wait().is_success());
}

#[test]
fn test_ticker_runs_due_slot_once() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    fs::write(src.path().join("a.csv"), b"a").unwrap();

    let settings = folder_settings(src.path(), dst.path())
        .with(keys::AUTO_DAY, 15)
        .with(keys::AUTO_INTERVAL, 1)
        .with(keys::AUTO_TIME, "06:00")
        .with(keys::AUTO_OPERATION, "copy");
    let history = Arc::new(MemoryRunHistory::new(Some(date(2024, 1, 15))));
    let coordinator = Arc::new(
        RunCoordinator::new(Arc::new(settings), history.clone())
            .with_space_probe(Arc::new(FixedSpace::gb(50.0))),
    );
    let ticker = Ticker::new(coordinator);

    // Down since January: February's missed slot does not fire, March's does.
    match ticker.tick(at(2024, 3, 10, 9, 30)) {
        TickOutcome::NotDue(evaluation) => {
            assert_eq!(evaluation.next_run, at(2024, 3, 15, 6, 0));
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }
    assert!(!dst.path().join("a.csv").exists());

    match ticker.tick(at(2024, 3, 15, 6, 0)) {
        TickOutcome::Started { operation, handle } => {
            assert_eq!(operation, Operation::Copy);
            assert!(handle.wait().is_success());
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }
    assert_eq!(history.get(), Some(date(2024, 3, 15)));
    assert!(dst.path().join("a.csv").exists());

    match ticker.tick(at(2024, 3, 15, 6, 1)) {
        TickOutcome::NotDue(evaluation) => {
            assert_eq!(evaluation.next_run, at(2024, 4, 15, 6, 0));
        }
        other => panic!("unexpected tick outcome {:?}", other),
    }
}
