use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Remove media files that no record of the OSER backend references anymore.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command, overriding file and environment config.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the media root directory.
    #[arg(long, global = true)]
    pub media_root: Option<PathBuf>,
    /// Override the SQLite database path.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    /// Enable or disable logging (true/false).
    #[arg(long, global = true)]
    pub logging: Option<bool>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delete unused media files once.
    Clean {
        /// Only consider files below this storage directory.
        #[arg(long)]
        top: Option<String>,
        /// List unused files without deleting them.
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete unused media files periodically until interrupted.
    Schedule {
        /// Only consider files below this storage directory.
        #[arg(long)]
        top: Option<String>,
        /// Seconds between two runs, instead of the configured interval.
        #[arg(long)]
        every: Option<u64>,
    },
    /// Print the registered record types as JSON.
    Fields,
}
