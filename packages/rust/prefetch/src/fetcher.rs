//! Content retrieval seam for the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use convoreplay_shared::{PrefetchConfig, ReplayError, Result};

/// User-Agent string for prefetch requests.
const USER_AGENT: &str = concat!("convoreplay-prefetch/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Retrieves the text behind a context item's url.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches `http(s)://` urls over the network and `file://` urls from disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &PrefetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReplayError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                let path = parsed.to_file_path().map_err(|()| {
                    ReplayError::invalid_locator(format!("not a local path: {url}"))
                })?;
                return tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| ReplayError::io(path, e));
            }
        }

        debug!(%url, "prefetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReplayError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplayError::from_status(url, status.as_u16(), "Context file"));
        }

        response
            .text()
            .await
            .map_err(|e| ReplayError::Network(format!("{url}: failed to read body: {e}")))
    }
}
