//! Command line interface definition

use berth_types::ColorChoice;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// berth - queue-driven installer for packages and web apps
#[derive(Parser)]
#[command(name = "berth")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Queue-driven installer for packages and web apps")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write JSON debug logs to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH", env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Queue every job in a TOML job file and run the queue to completion
    #[command(alias = "add")]
    Enqueue {
        /// Job file with one `[[jobs]]` table per job
        file: PathBuf,
    },

    /// Queue a batch of updates and announce the result once the batch drains
    #[command(alias = "up")]
    UpdateAll {
        /// Job file listing the update candidates
        file: PathBuf,
    },

    /// List persisted jobs
    #[command(alias = "ls")]
    List,

    /// Cancel a job and flush its cached artifacts
    #[command(alias = "rm")]
    Cancel {
        /// Job id
        id: String,
    },

    /// Show download progress of a job
    Progress {
        /// Job id
        id: String,
    },

    /// List packages with a recorded signature or version conflict
    Faults,

    /// Resubmit jobs left over from a previous run and drain the queue
    Resume,
}

impl Commands {
    /// Command name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Enqueue { .. } => "enqueue",
            Commands::UpdateAll { .. } => "update-all",
            Commands::List => "list",
            Commands::Cancel { .. } => "cancel",
            Commands::Progress { .. } => "progress",
            Commands::Faults => "faults",
            Commands::Resume => "resume",
        }
    }

    /// Whether the command drives the install pipeline rather than just reading records
    pub fn runs_pipeline(&self) -> bool {
        matches!(
            self,
            Commands::Enqueue { .. } | Commands::UpdateAll { .. } | Commands::Resume
        )
    }

    /// Validate command arguments
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Commands::Cancel { id } | Commands::Progress { id } if id.trim().is_empty() => {
                Err("Job id cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}
