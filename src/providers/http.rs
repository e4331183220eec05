//! Default page transport over HTTP(S)

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::traits::Transport;
use crate::error::{DownloadError, Error, Result};

/// Per-request timeout used by [`HttpTransport::new`]
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// [`Transport`] backed by a shared `reqwest` client
///
/// Non-success statuses are failures, so the chapter retry policy applies to
/// them like to connection errors. URLs that are not absolute `http(s)` URLs
/// fail with [`Error::Transport`] before any request is made.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the default timeout and user agent
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("chapter-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (headers, proxy, cookies)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_bytes(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Transport(format!("invalid page url '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Transport(format!(
                "unsupported scheme '{}' in page url '{url}'",
                parsed.scheme()
            )));
        }

        let request = async {
            let response = self.client.get(parsed).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                }
                .into());
            }
            Ok(response.bytes().await?.to_vec())
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }
}
