use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "auto-transfer")]
#[command(about = "Scheduled monthly move, copy and purge of files between two folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the background scheduler until Ctrl-C
    Daemon,
    /// Move eligible files from source to destination now
    Move,
    /// Copy eligible files from source to destination now
    Copy,
    /// Delete eligible files from source now
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the last run and the next scheduled run
    NextRun,
    /// Print configuration values and operator settings
    PrintConfig,
    /// Write one operator setting, e.g. `set auto_day 15`
    Set { key: String, value: String },
}
