use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use crate::config::ProviderConfig;

use super::{FetchError, WeatherProvider, truncate_body};

/// Client for the NWS National Digital Forecast Database "by day" service.
#[derive(Debug, Clone)]
pub struct NdfdProvider {
    config: ProviderConfig,
    url: Url,
    http: Client,
}

impl NdfdProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, FetchError> {
        Self::build(config, false)
    }

    /// Like [`NdfdProvider::new`] but also accepts `http://` endpoints.
    /// Only meant for pointing at a local mock server.
    pub fn new_allowing_http(config: ProviderConfig) -> Result<Self, FetchError> {
        Self::build(config, true)
    }

    fn build(config: ProviderConfig, allow_http: bool) -> Result<Self, FetchError> {
        let url = Url::parse(&config.endpoint).map_err(|e| FetchError::InvalidUrl {
            url: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "https" => {}
            "http" if allow_http => {}
            _ => return Err(FetchError::InsecureUrl(config.endpoint.clone())),
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .https_only(!allow_http)
            .build()
            .map_err(FetchError::Request)?;

        Ok(Self { config, url, http })
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("whichClient", "NDFDgenByDay".to_string()),
            ("lat", self.config.latitude.to_string()),
            ("lon", self.config.longitude.to_string()),
            ("format", "24 hourly".to_string()),
            ("numDays", self.config.num_days.to_string()),
            ("Unit", self.config.units.ndfd_code().to_string()),
        ]
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.config.timeout())
        } else {
            FetchError::Request(err)
        }
    }
}

#[async_trait]
impl WeatherProvider for NdfdProvider {
    #[instrument(skip(self), fields(url = %self.url, days = self.config.num_days))]
    async fn fetch_forecast(&self) -> Result<Vec<u8>, FetchError> {
        debug!("fetching NDFD forecast");

        let mut res = self
            .http
            .get(self.url.clone())
            .query(&self.query())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body: truncate_body(&body) });
        }

        let limit = self.config.max_body_bytes;
        if res.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::BodyTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = res.chunk().await.map_err(|e| self.classify(e))? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(%status, bytes = body.len(), "received forecast");

        Ok(body)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
