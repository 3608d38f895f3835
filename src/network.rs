use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server returned status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Empty response body from {0}")]
    EmptyBody(String),
    #[error("Failed to read {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),
    #[error("Fetch failed: {0}")]
    Other(String),
}

/// Transport for cover images (allows mocking for tests)
#[async_trait::async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches covers over HTTP(S), or from disk for `file://` URLs
pub struct HttpCoverFetcher {
    client: reqwest::Client,
}

impl HttpCoverFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(HttpCoverFetcher { client })
    }
}

#[async_trait::async_trait]
impl CoverFetcher for HttpCoverFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            let path = PathBuf::from(path);
            debug!("Reading cover from {}", path.display());
            return tokio::fs::read(&path)
                .await
                .map_err(|source| FetchError::File { path, source });
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::UnsupportedUrl(url.to_string()));
        }

        debug!("Downloading cover from {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }

        info!("Downloaded cover ({} bytes) from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
