//! Tidewave CLI entry point.
//!
//! Binary name: `tidewave`
//!
//! Parses CLI arguments, initializes tracing, then dispatches to the
//! appropriate command handler.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise derive the filter from verbosity flags.
    let fallback = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,tidewave=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let exit_code = match cli.command {
        Commands::Run {
            file,
            files,
            gates,
            dry_run,
            budget,
        } => {
            cli::run::handle_run(
                &file,
                &files,
                gates.as_deref(),
                dry_run,
                budget,
                cli.json,
            )
            .await?
        }
        Commands::Validate { file } => cli::run::handle_validate(&file, cli.json)?,
    };

    std::process::exit(exit_code);
}
