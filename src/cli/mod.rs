use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Path of the configuration file. A starter template is written there
    /// when the file doesn't exist yet.
    #[arg(long, env = "DUMPWATCH_CONFIG", default_value = "dumpwatch.toml")]
    pub config: PathBuf,

    /// Folder for database dumps, overriding the configured one.
    #[arg(long, short = 'r')]
    pub output_root: Option<PathBuf>,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Back up configured connections. (Default)
    Backup(BackupArgs),

    /// Report where each engine's dump tool was found.
    Tools,
}

impl Default for Action {
    fn default() -> Self {
        Action::Backup(BackupArgs::default())
    }
}

#[derive(Args, Debug, Default)]
pub struct BackupArgs {
    /// Back up only this connection id. May be repeated; without it every
    /// configured connection is backed up.
    #[arg(long = "connection", short = 'c')]
    pub connections: Vec<String>,
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
