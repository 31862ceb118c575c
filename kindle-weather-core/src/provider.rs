use crate::{
    Config,
    provider::{file::FileProvider, ndfd::NdfdProvider},
};
use async_trait::async_trait;
use std::{fmt::Debug, io, path::PathBuf, time::Duration};
use thiserror::Error;

pub mod file;
pub mod ndfd;

/// Failures while obtaining the raw forecast document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("refusing to fetch weather over a non-HTTPS URL: {0}")]
    InsecureUrl(String),

    #[error("invalid provider URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("weather request timed out after {0:?}")]
    Timeout(Duration),

    #[error("weather request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("weather provider answered with status {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("weather response exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("Failed to read weather data from {}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Return the raw forecast document. Exactly one attempt, no retries.
    async fn fetch_forecast(&self) -> Result<Vec<u8>, FetchError>;

    /// Short human readable origin, used in logs.
    fn describe(&self) -> String;
}

/// Construct the provider for a run: a local file when `input` is given,
/// otherwise the NDFD web service described by `config`.
pub fn provider_from_config(
    config: &Config,
    input: Option<PathBuf>,
) -> Result<Box<dyn WeatherProvider>, FetchError> {
    let boxed: Box<dyn WeatherProvider> = match input {
        Some(path) => Box::new(FileProvider::new(path, config.provider.max_body_bytes)),
        None => Box::new(NdfdProvider::new(config.provider.clone())?),
    };

    Ok(boxed)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
