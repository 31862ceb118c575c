use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::{FetchError, WeatherProvider};

/// Reads a previously saved NDFD response from disk.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
    max_bytes: u64,
}

impl FileProvider {
    pub fn new(path: PathBuf, max_bytes: u64) -> Self {
        Self { path, max_bytes }
    }
}

#[async_trait]
impl WeatherProvider for FileProvider {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_forecast(&self) -> Result<Vec<u8>, FetchError> {
        let file_err = |source| FetchError::File { path: self.path.clone(), source };

        let len = tokio::fs::metadata(&self.path).await.map_err(file_err)?.len();
        if len > self.max_bytes {
            return Err(FetchError::BodyTooLarge { limit: self.max_bytes });
        }

        let body = tokio::fs::read(&self.path).await.map_err(file_err)?;
        debug!(bytes = body.len(), "read forecast from file");

        Ok(body)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
