//! Binary crate for the `kindle-weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and applying them over the config file
//! - Interactive configuration
//! - Logging setup and exit codes

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod configure;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cmd = cli::Cli::parse();
    init_tracing(cmd.verbose, cmd.quiet);

    match cmd.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(cli::exit_code(&err))
        }
    }
}

/// Logs go to stderr so `run --dry-run` can stream the image on stdout.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
