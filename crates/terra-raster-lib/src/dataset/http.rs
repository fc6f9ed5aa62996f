//! HTTP client abstraction for testability

use super::DatasetError;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Asynchronous GET of raw tile bytes.
///
/// Implementations report a missing resource as [`DatasetError::NotFound`] so
/// datasets can tell "no data here" apart from a transport failure.
pub trait HttpClient: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<Bytes, DatasetError>> + Send;
}

/// Default User-Agent string for HTTP requests.
/// Some tile servers reject requests without one.
const DEFAULT_USER_AGENT: &str = concat!("terra-raster/", env!("CARGO_PKG_VERSION"));

/// Real HTTP client implementation using reqwest.
///
/// `file://` URLs are read from the local filesystem, which lets datasets be
/// served from a directory of tiles.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with a 30 second timeout.
    pub fn new() -> Result<Self, DatasetError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, DatasetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DatasetError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn read_file(path: &str) -> Result<Bytes, DatasetError> {
        let owned = path.to_string();
        let read = tokio::task::spawn_blocking(move || std::fs::read(owned))
            .await
            .map_err(|e| DatasetError::Task(e.to_string()))?;
        match read {
            Ok(data) => {
                trace!(path, bytes = data.len(), "file read");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DatasetError::NotFound(path.to_string()))
            }
            Err(e) => Err(DatasetError::Network(format!("failed to read {path}: {e}"))),
        }
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Bytes, DatasetError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Self::read_file(path).await;
        }

        trace!(url = url, "HTTP GET request starting");

        let response = match self.client.get(url).send().await {
            Ok(resp) => {
                debug!(url = url, status = resp.status().as_u16(), "HTTP response received");
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(DatasetError::Network(format!("request failed: {e}")));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DatasetError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "HTTP error status");
            return Err(DatasetError::Network(format!("HTTP {status} from {url}")));
        }

        match response.bytes().await {
            Ok(bytes) => {
                trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes)
            }
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(DatasetError::Network(format!("failed to read response: {e}")))
            }
        }
    }
}

/// Try each candidate URL in order and return the first body fetched.
///
/// Returns `Ok(None)` when every candidate reported not-found, and the last
/// error when at least one failed for another reason.
pub async fn fetch_with_fallback<C: HttpClient>(
    client: &C,
    urls: &[String],
) -> Result<Option<Bytes>, DatasetError> {
    let mut last_error = None;
    for url in urls {
        match client.get(url).await {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(DatasetError::NotFound(_)) => {
                debug!(url = url.as_str(), "tile not found, trying next candidate");
            }
            Err(e) => {
                warn!(url = url.as_str(), error = %e, "tile candidate failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}
