//! Remote telemetry over HTTP.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{SweepError, SweepResult};

use super::{TelemetryRecord, TelemetrySink};

/// POSTs each row as JSON with a bearer token.
pub struct WebhookSink {
    url: reqwest::Url,
    token: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str, token: impl Into<String>) -> SweepResult<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| SweepError::config(format!("invalid telemetry.webhook_url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SweepError::Telemetry(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url,
            token: token.into(),
            client,
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl TelemetrySink for WebhookSink {
    async fn record(&self, record: &TelemetryRecord) -> SweepResult<()> {
        self.client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
