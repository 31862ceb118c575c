use anyhow::{Context, Result, anyhow};
use inquire::{CustomType, Select, Text};
use kindle_weather_core::{Config, FileMode, OutputFormat, Units, config::MAX_DAYS};
use std::path::{Path, PathBuf};

/// Prompt for the settings a new display usually needs, starting from the
/// existing config file if there is one, then save it.
pub fn run(path: Option<&Path>) -> Result<PathBuf> {
    let mut config = match path {
        Some(path) if path.exists() => Config::load_from(path)?,
        Some(_) => Config::default(),
        None => Config::load()?,
    };

    let provider = &mut config.provider;
    provider.latitude = CustomType::<f64>::new("Latitude:")
        .with_default(provider.latitude)
        .with_error_message("Please enter a decimal number, e.g. 38.7197")
        .prompt()?;
    provider.longitude = CustomType::<f64>::new("Longitude:")
        .with_default(provider.longitude)
        .with_error_message("Please enter a decimal number, e.g. -77.1546")
        .prompt()?;
    provider.num_days = CustomType::<usize>::new(&format!("Days to show (1-{MAX_DAYS}):"))
        .with_default(provider.num_days)
        .prompt()?;

    let units = ["imperial", "metric"];
    let cursor = match provider.units {
        Units::Imperial => 0,
        Units::Metric => 1,
    };
    provider.units = match Select::new("Units:", units.to_vec()).with_starting_cursor(cursor).prompt()? {
        "metric" => Units::Metric,
        _ => Units::Imperial,
    };

    let output = &mut config.output;
    let destination = output.destination.display().to_string();
    output.destination = Text::new("Output file:").with_default(&destination).prompt()?.into();

    let mode = output.mode.to_string();
    let mode = Text::new("File mode (octal):").with_default(&mode).prompt()?;
    output.mode = mode.parse::<FileMode>().map_err(|e| anyhow!(e))?;

    let formats = vec![OutputFormat::Svg, OutputFormat::Png];
    let cursor = formats.iter().position(|f| *f == output.format).unwrap_or(0);
    output.format = Select::new("Output format:", formats).with_starting_cursor(cursor).prompt()?;

    config.validate().context("The entered configuration is not valid")?;

    match path {
        Some(path) => {
            config.save_to(path)?;
            Ok(path.to_path_buf())
        }
        None => config.save(),
    }
}
