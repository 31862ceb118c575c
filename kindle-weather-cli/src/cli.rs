use anyhow::Context;
use chrono::Days;
use clap::{Args, Parser, Subcommand};
use kindle_weather_core::{Config, FileMode, OutputFormat, Pipeline, PipelineError, ValidatedReading};
use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::configure;

/// Exit status for configuration problems (same as clap's usage errors).
const CONFIG_EXIT: u8 = 2;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "kindle-weather", version, about = "Render an NWS forecast for an e-reader display")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Config file; defaults to the platform config directory.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Read the NDFD XML from this file instead of the network.
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, render and install the weather image.
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file, overriding `output.destination`.
        #[arg(long, short = 'o')]
        destination: Option<PathBuf>,

        /// Octal file mode for the output, e.g. 644.
        #[arg(long)]
        mode: Option<FileMode>,

        /// Network timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format: svg or png.
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Write the image to stdout instead of installing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch and validate the forecast and print it, without rendering.
    Check {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the validated reading as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactively create or update the config file.
    Configure {
        /// Where to save; defaults to the platform config directory.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// Marks an error as a configuration problem for exit code purposes.
#[derive(Debug)]
struct InvalidConfig;

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration")
    }
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(pipeline) = err.downcast_ref::<PipelineError>() {
        pipeline.exit_code()
    } else if err.downcast_ref::<InvalidConfig>().is_some() {
        CONFIG_EXIT
    } else {
        1
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run { source, destination, mode, timeout, format, dry_run } => {
                let mut config = load_config(source.config.as_deref())?;

                if let Some(destination) = destination {
                    config.output.destination = destination;
                }
                if let Some(mode) = mode {
                    config.output.mode = mode;
                }
                if let Some(timeout) = timeout {
                    config.provider.timeout_secs = timeout;
                }
                if let Some(format) = format {
                    config.output.format = format;
                }
                config.validate().context(InvalidConfig)?;

                let pipeline = Pipeline::from_config(&config, source.input)?;

                if dry_run {
                    let (_, image) = pipeline.render().await?;
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&image.bytes).context("Failed to write image to stdout")?;
                    stdout.flush().context("Failed to write image to stdout")?;
                } else {
                    let report = pipeline.run().await?;
                    info!(
                        source = %report.source,
                        starts_on = %report.starts_on,
                        days = report.days,
                        bytes = report.bytes,
                        destination = %report.destination.display(),
                        "weather display updated"
                    );
                }
            }
            Command::Check { source, json } => {
                let config = load_config(source.config.as_deref())?;
                config.validate().context(InvalidConfig)?;

                let pipeline = Pipeline::from_config(&config, source.input)?;
                let reading = pipeline.reading().await?;

                if json {
                    let out = serde_json::to_string_pretty(&reading)
                        .context("Failed to serialize forecast to JSON")?;
                    println!("{out}");
                } else {
                    print_reading(&reading);
                }
            }
            Command::Configure { config } => {
                let path = configure::run(config.as_deref())?;
                println!("Saved configuration to {}", path.display());
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context(InvalidConfig)
}

fn print_reading(reading: &ValidatedReading) {
    println!("Forecast starting {}", reading.starts_on().format("%A %Y-%m-%d"));

    for (i, day) in reading.days().iter().enumerate() {
        let date = reading
            .starts_on()
            .checked_add_days(Days::new(i as u64))
            .map(|d| d.format("%a %m-%d").to_string())
            .unwrap_or_else(|| format!("day {}", i + 1));

        println!(
            "  {date}  {:>6} / {:<6}  {:<8} {}",
            day.high.to_string(),
            day.low.to_string(),
            day.icon.as_str(),
            day.condition
        );
    }
}
