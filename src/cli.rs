//! CLI argument parsing for taskblame

use crate::report::{MetricSelection, ReportFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskblame")]
#[command(version)]
#[command(
    about = "Blame background task duration among the worker and the external subsystems it waits on",
    long_about = None
)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attribute one task's wall-clock time to worker wait/exec and external wait/exec
    Blame(BlameArgs),

    /// Worker load statistics over time from a steps file
    Heat(HeatArgs),

    /// Check that external tasks were polled frequently enough
    Polling(PollingArgs),
}

#[derive(clap::Args, Debug)]
pub struct BlameArgs {
    /// Task-export directory with the tasks, steps and actions files
    pub export_dir: PathBuf,

    /// Task or execution plan id
    #[arg(long, value_name = "UUID")]
    pub uuid: String,

    /// Metric used for blaming (default: relative-blame, or the config value)
    #[arg(long, value_enum)]
    pub metric: Option<MetricSelection>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// Analysis time (seconds since epoch or 'YYYY-MM-DD HH:MM:SS'), default: now
    #[arg(long, value_name = "TIME")]
    pub now: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct HeatArgs {
    /// Steps file
    pub steps_file: PathBuf,

    /// Consider steps from this time (seconds since epoch or 'YYYY-MM-DD HH:MM:SS')
    #[arg(long, value_name = "TIME")]
    pub from: Option<String>,

    /// Consider steps up to this time (seconds since epoch or 'YYYY-MM-DD HH:MM:SS')
    #[arg(long, value_name = "TIME")]
    pub to: Option<String>,

    /// Rows in each top-labels table (default: 5, or the config value)
    #[arg(long, value_name = "N")]
    pub items_limit: Option<usize>,

    /// Load timeline CSV (default: <STEPS_FILE>.worker_load.csv)
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Analysis time, closes running steps and the last slice
    #[arg(long, value_name = "TIME")]
    pub now: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PollingArgs {
    /// Report directory (preferred) or a single log file
    pub path: PathBuf,

    /// Polling multiplier; overrides the one found in the settings table
    #[arg(long = "poll-multiplier", short = 'm', visible_alias = "multiplier", value_name = "N")]
    pub multiplier: Option<u64>,

    /// Extra seconds tolerated for whole-second log timestamps
    #[arg(long = "add-rounding-error", short = 'a', value_name = "SECS")]
    pub rounding_error: Option<u64>,
}
