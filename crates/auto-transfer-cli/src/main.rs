mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use auto_transfer_core::settings::{self, keys, SettingsStore};
use auto_transfer_core::{
    ActionLog, AppConfig, JsonRunHistory, Operation, Outcome, ProgressReporter, ReporterSet,
    RunCoordinator, Ticker, TomlSettingsStore,
};
use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match auto_transfer_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Daemon) => run_daemon(&config)?,
        Some(Commands::Move) => run_once(&config, Operation::Move)?,
        Some(Commands::Copy) => run_once(&config, Operation::Copy)?,
        Some(Commands::Delete { yes }) => {
            if !yes
                && !prompt_confirm(
                    "Delete eligible files from the source folder? This cannot be undone.",
                    Some(false),
                )?
            {
                process::exit(0);
            }
            run_once(&config, Operation::Delete)?
        }
        Some(Commands::NextRun) => print_next_run(&config)?,
        Some(Commands::PrintConfig) => print_config(&config)?,
        Some(Commands::Set { key, value }) => set_setting(&config, &key, &value)?,
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn open_settings(config: &AppConfig) -> Result<TomlSettingsStore> {
    TomlSettingsStore::open(&config.settings_path)
        .with_context(|| format!("opening settings file {}", config.settings_path))
}

fn build_coordinator(
    config: &AppConfig,
    reporter: Option<Arc<dyn ProgressReporter>>,
) -> Result<Arc<RunCoordinator>> {
    let settings = open_settings(config)?;
    let history = JsonRunHistory::new(&config.history_path);
    let action_log = ActionLog::open(&config.action_log_path)
        .with_context(|| format!("opening action log {}", config.action_log_path))?;

    let mut reporters = ReporterSet::new().with(Arc::new(action_log));
    if let Some(reporter) = reporter {
        reporters = reporters.with(reporter);
    }

    Ok(Arc::new(
        RunCoordinator::new(Arc::new(settings), Arc::new(history))
            .with_reporter(Arc::new(reporters)),
    ))
}

fn run_once(config: &AppConfig, operation: Operation) -> Result<()> {
    let coordinator = build_coordinator(config, Some(Arc::new(CliReporter::new())))?;

    let on_interrupt = coordinator.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received. Stopping after the current file...");
        on_interrupt.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let outcome = coordinator.run_blocking(operation)?;
    if let Outcome::Failed(reason) = outcome {
        bail!("{} failed: {}", operation, reason);
    }
    Ok(())
}

fn run_daemon(config: &AppConfig) -> Result<()> {
    let coordinator = build_coordinator(config, None)?;
    let ticker = Ticker::new(coordinator.clone());

    ticker.bootstrap_history(Local::now().date_naive())?;
    info!("{}", ticker.status_line(Local::now().naive_local()));

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("installing Ctrl-C handler")?;

    let handle = ticker.spawn(config.startup_delay(), config.tick_interval())?;
    info!(
        "Scheduler running, checking every {}s. Press Ctrl-C to stop.",
        config.tick_interval().as_secs()
    );

    let _ = stop_rx.recv();
    info!("Shutting down...");
    handle.stop();

    if coordinator.is_running() {
        info!("Waiting for the active run to stop after its current file...");
        coordinator.cancel();
        while coordinator.is_running() {
            thread::sleep(Duration::from_millis(200));
        }
    }
    Ok(())
}

fn print_next_run(config: &AppConfig) -> Result<()> {
    let settings = open_settings(config)?;
    let history = JsonRunHistory::new(&config.history_path);
    let coordinator = Arc::new(RunCoordinator::new(Arc::new(settings), Arc::new(history)));
    let ticker = Ticker::new(coordinator);

    println!("{}", ticker.status_line(Local::now().naive_local()));
    Ok(())
}

fn print_config(config: &AppConfig) -> Result<()> {
    println!("Configuration: {:?}", config);

    let settings = open_settings(config)?;
    let stored = settings.entries();
    println!("Settings ({}):", config.settings_path);
    for key in keys::ALL {
        let value = settings::value_to_string(&settings.get_or_default(key));
        if stored.contains_key(key) {
            println!("  {} = {}", key.cyan(), value);
        } else {
            println!("  {} = {} {}", key.cyan(), value, "(default)".dimmed());
        }
    }
    Ok(())
}

fn set_setting(config: &AppConfig, key: &str, raw: &str) -> Result<()> {
    if !keys::ALL.contains(&key) {
        bail!(
            "Unknown setting '{}'. Known settings: {}",
            key,
            keys::ALL.join(", ")
        );
    }

    let settings = open_settings(config)?;
    let value = settings::parse_value(raw);
    settings
        .set(key, value.clone())
        .with_context(|| format!("writing {} to {}", key, config.settings_path))?;
    info!("{} = {}", key.cyan(), settings::value_to_string(&value).green());
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
