//! Model launch endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::client::XinferenceClient;
use super::types::{LaunchModelRequest, LaunchModelResponse, LaunchRejected};
use crate::config::{LaunchSpec, MODELS_PATH};
use crate::startup::ModelLauncher;

impl XinferenceClient {
    /// Ask the server to load `spec`. Blocks until the model is loaded,
    /// which for large video models can take many minutes.
    pub async fn launch(&self, spec: &LaunchSpec) -> Result<String> {
        let url = self.build_url(MODELS_PATH)?;
        let body = LaunchModelRequest::from(spec);

        debug!("=== Launch Request ===");
        debug!("URL: {}", url);
        debug!("Timeout: {:?}", self.launch_timeout);
        debug!(
            "Body: {}",
            serde_json::to_string(&body).unwrap_or_else(|_| "<unserializable>".to_string())
        );

        let client = self.client_with_timeout(self.launch_timeout)?;
        let response = client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send launch request to {}", url))?;

        let status = response.status();
        debug!("=== Launch Response ===");
        debug!("Status: {}", status);

        let text = response
            .text()
            .await
            .context("Failed to read launch response body")?;

        if !status.is_success() {
            return Err(LaunchRejected::from_http_response(status.as_u16(), &text).into());
        }

        let parsed: LaunchModelResponse =
            serde_json::from_str(&text).context("Failed to parse launch response")?;
        Ok(parsed.model_uid)
    }
}

#[async_trait]
impl ModelLauncher for XinferenceClient {
    async fn launch_model(&self, spec: &LaunchSpec) -> Result<String> {
        self.launch(spec).await
    }
}
