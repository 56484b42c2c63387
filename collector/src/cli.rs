use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grin-stats")]
#[command(about = "Collects Grin network statistics and exports dashboard datasets", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file (optional, uses defaults if not provided)
    #[arg(short, long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Output directory for the published JSON datasets
    #[arg(long, global = true)]
    pub www_data: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create the database schema only
    InitDb,
    /// Backfill sampled history, then refresh peers and export
    InitHistory,
    /// Fetch new blocks, refresh peers and export (default)
    Update,
    /// Refresh peer data and export
    PeersOnly,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Update)
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}
