//! Core library for the `kindle-weather` display generator.
//!
//! This crate defines:
//! - Configuration handling
//! - The forecast providers (NWS NDFD over HTTPS, or a local file)
//! - Hardened XML parsing of the NDFD "by day" document
//! - The icon allowlist guarding what reaches the SVG markup
//! - Template rendering and atomic installation of the output
//!
//! It is used by `kindle-weather-cli`, but [`Pipeline`] can be driven by any
//! other runner as well.

pub mod allowlist;
pub mod config;
pub mod install;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod provider;
pub mod render;

pub use allowlist::{IconAllowlist, IconId, ValidatedReading, ValidationError};
pub use config::{Config, OutputConfig, ProviderConfig, Units};
pub use install::{FileMode, InstallError, Installer};
pub use model::{DailyForecast, Temperature, TemperatureUnit, WeatherReading};
pub use parse::{ParseError, parse_forecast};
pub use pipeline::{Pipeline, PipelineError, RunReport};
pub use provider::{FetchError, WeatherProvider};
pub use render::{OutputFormat, RenderError, RenderedImage, Renderer, Template};
