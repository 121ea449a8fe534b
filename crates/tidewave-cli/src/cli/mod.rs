//! CLI argument definitions.

pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Workflow orchestration for AI and deterministic tools.
#[derive(Parser)]
#[command(name = "tidewave", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow file to completion.
    Run {
        /// Path to the workflow YAML (or JSON) file.
        file: PathBuf,

        /// File patterns handed to adapters as the working set.
        #[arg(long = "files", value_name = "PATTERN")]
        files: Vec<String>,

        /// Path to a YAML file declaring quality gates.
        #[arg(long, value_name = "FILE")]
        gates: Option<PathBuf>,

        /// Validate and simulate without invoking any adapter.
        #[arg(long)]
        dry_run: bool,

        /// Budget for the run; steps past the limit stay pending.
        #[arg(long, value_name = "AMOUNT")]
        budget: Option<f64>,
    },

    /// Parse and validate a workflow file without running it.
    Validate {
        /// Path to the workflow YAML (or JSON) file.
        file: PathBuf,
    },
}
