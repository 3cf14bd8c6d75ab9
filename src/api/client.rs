use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default request timeout in seconds
pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the User-Agent string
fn build_user_agent() -> String {
    format!("xinference-bootstrap/{}", DEFAULT_VERSION)
}

/// HTTP client for the Xinference control API
pub struct XinferenceClient {
    pub(super) client: Client,
    pub(super) base_url: Url,
    pub(super) launch_timeout: Duration,
}

impl XinferenceClient {
    /// Create a new client rooted at `base_url`.
    pub fn new(base_url: Url, launch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(build_user_agent())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            launch_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(super) fn build_url(&self, endpoint: &str) -> Result<Url> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build URL for endpoint: {}", endpoint))?;
        debug!("Resolved {} -> {}", endpoint, url);
        Ok(url)
    }

    pub(super) fn client_with_timeout(&self, timeout: Duration) -> Result<Client> {
        if timeout == Duration::from_secs(DEFAULT_TIMEOUT_SECS) {
            return Ok(self.client.clone());
        }

        Client::builder()
            .timeout(timeout)
            .user_agent(build_user_agent())
            .build()
            .context("Failed to build HTTP client")
    }
}
