//! Readiness check against the model listing endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::client::XinferenceClient;
use crate::config::MODELS_PATH;
use crate::startup::ReadinessProbe;

/// Timeout for a single readiness probe (short, the server is local)
const PROBE_TIMEOUT_SECS: u64 = 5;

impl XinferenceClient {
    /// List running models. Any 2xx counts as "the control API is up".
    pub async fn check_ready(&self) -> Result<()> {
        let url = self.build_url(MODELS_PATH)?;

        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        debug!("Readiness probe {} -> {}", url, status);

        if !status.is_success() {
            anyhow::bail!("{} answered HTTP {}", url, status.as_u16());
        }

        Ok(())
    }
}

#[async_trait]
impl ReadinessProbe for XinferenceClient {
    fn target(&self) -> String {
        format!("{}{}", self.base_url, MODELS_PATH)
    }

    async fn probe(&self) -> Result<()> {
        self.check_ready().await
    }
}
