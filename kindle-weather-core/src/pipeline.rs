//! The fetch → parse → validate → render → install sequence.
//!
//! Every stage runs once; the first failure ends the run.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::{
    Config,
    allowlist::{IconAllowlist, ValidatedReading, ValidationError},
    install::{InstallError, Installer},
    parse::{ParseError, parse_forecast},
    provider::{FetchError, WeatherProvider, provider_from_config},
    render::{OutputFormat, RenderError, RenderedImage, Renderer, Template},
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Install(#[from] InstallError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Network(_) => "fetch",
            PipelineError::Parse(_) => "parse",
            PipelineError::Validation(_) => "validate",
            PipelineError::Render(_) => "render",
            PipelineError::Install(_) => "install",
        }
    }

    /// Process exit status for this failure. 1 and 2 are left to generic and usage errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Network(_) => 3,
            PipelineError::Parse(_) => 4,
            PipelineError::Validation(_) => 5,
            PipelineError::Render(_) => 6,
            PipelineError::Install(_) => 7,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    pub starts_on: NaiveDate,
    pub days: usize,
    pub format: OutputFormat,
    pub bytes: usize,
    pub destination: PathBuf,
}

#[derive(Debug)]
pub struct Pipeline {
    provider: Box<dyn WeatherProvider>,
    num_days: usize,
    allowlist: IconAllowlist,
    renderer: Renderer,
    installer: Installer,
}

impl Pipeline {
    pub fn new(
        provider: Box<dyn WeatherProvider>,
        num_days: usize,
        allowlist: IconAllowlist,
        renderer: Renderer,
        installer: Installer,
    ) -> Self {
        Self { provider, num_days, allowlist, renderer, installer }
    }

    /// Build every stage from a validated [`Config`]. `input` replaces the
    /// network fetch with a local file.
    pub fn from_config(config: &Config, input: Option<PathBuf>) -> Result<Self, PipelineError> {
        let provider = provider_from_config(config, input)?;
        let allowlist = IconAllowlist::new(config.icons.allowlist.iter().cloned())?;

        let template = match &config.output.template {
            Some(path) => Template::from_path(path)?,
            None => Template::builtin(),
        };
        let renderer = Renderer::new(template, config.output.format);
        let installer = Installer::new(config.output.destination.clone(), config.output.mode);

        Ok(Self::new(provider, config.provider.num_days, allowlist, renderer, installer))
    }

    /// Fetch, parse and validate, stopping before anything is rendered.
    pub async fn reading(&self) -> Result<ValidatedReading, PipelineError> {
        let source = self.provider.describe();
        info!(%source, "fetching forecast");
        let raw = self.provider.fetch_forecast().await?;

        let reading = parse_forecast(&raw, self.num_days)?;
        info!(starts_on = %reading.starts_on, days = reading.days.len(), "parsed forecast");

        let validated = self.allowlist.validate_reading(&reading)?;
        Ok(validated)
    }

    /// Everything up to, but not including, installation.
    pub async fn render(&self) -> Result<(ValidatedReading, RenderedImage), PipelineError> {
        let reading = self.reading().await?;
        let image = self.renderer.render(&reading)?;
        info!(format = %image.format, bytes = image.bytes.len(), "rendered image");
        Ok((reading, image))
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let (reading, image) = self.render().await?;
        let destination = self.installer.install(&image)?;

        Ok(RunReport {
            source: self.provider.describe(),
            starts_on: reading.starts_on(),
            days: reading.days().len(),
            format: image.format,
            bytes: image.bytes.len(),
            destination,
        })
    }
}
