//! Best-effort recording of submission outcomes.
//!
//! Every sink failure is downgraded to a warning by the orchestrator; a
//! missing webhook token turns the webhook into a no-op.

mod json_lines;
mod webhook;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{SweepError, SweepResult};
use crate::orchestrator::SubmissionOutcome;
use crate::resources::ResourceRequest;

pub use json_lines::JsonLinesSink;
pub use webhook::WebhookSink;

/// Environment variable holding the webhook bearer token.
pub const TOKEN_ENV: &str = "PARASWEEP_TELEMETRY_TOKEN";

/// One row per submission outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Identifies the sweep the row belongs to.
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub job_name: String,
    pub index: usize,
    /// Parameter values in declaration order.
    pub parameters: serde_json::Value,
    pub resources: Option<ResourceRequest>,
    pub success: bool,
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub continuation_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetryRecord {
    pub fn from_outcome(run_id: Uuid, outcome: &SubmissionOutcome) -> SweepResult<Self> {
        Ok(Self {
            run_id,
            timestamp: Utc::now(),
            job_name: outcome.job_name.clone(),
            index: outcome.index,
            parameters: serde_json::to_value(&outcome.parameters)?,
            resources: outcome.resources.clone(),
            success: outcome.success,
            job_id: outcome.job_id.clone(),
            continuation_ids: outcome.continuation_ids.clone(),
            error: outcome.error.clone(),
        })
    }
}

/// Append-only store for telemetry rows.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, record: &TelemetryRecord) -> SweepResult<()>;

    fn name(&self) -> &str;
}

/// Discards every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn record(&self, _record: &TelemetryRecord) -> SweepResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Writes to `primary`, and to a local backup file when that fails.
pub struct FallbackSink {
    primary: Box<dyn TelemetrySink>,
    backup: JsonLinesSink,
}

impl FallbackSink {
    pub fn new(primary: Box<dyn TelemetrySink>, backup: JsonLinesSink) -> Self {
        Self { primary, backup }
    }
}

#[async_trait]
impl TelemetrySink for FallbackSink {
    async fn record(&self, record: &TelemetryRecord) -> SweepResult<()> {
        match self.primary.record(record).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "Telemetry sink '{}' failed ({}), writing {} to {}",
                    self.primary.name(),
                    e,
                    record.job_name,
                    self.backup.path().display()
                );
                self.backup.record(record).await
            }
        }
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

/// Forwards each row to every inner sink; the first failure is reported
/// after all sinks have been tried.
pub struct MultiSink {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl TelemetrySink for MultiSink {
    async fn record(&self, record: &TelemetryRecord) -> SweepResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "multi"
    }
}

/// `telemetry` section of the run configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Local JSON-lines log of every outcome.
    #[serde(default)]
    pub json_lines: Option<PathBuf>,

    /// Remote endpoint receiving one POST per outcome.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Where rows go when the webhook is unreachable.
    #[serde(default)]
    pub backup: Option<PathBuf>,
}

impl TelemetryConfig {
    /// Reject a webhook URL that could never be posted to.
    pub fn validate(&self) -> SweepResult<()> {
        if let Some(ref url) = self.webhook_url {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                SweepError::config(format!("invalid telemetry.webhook_url '{url}': {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SweepError::config(format!(
                    "telemetry.webhook_url '{url}' must use http or https"
                )));
            }
        }
        Ok(())
    }

    /// Build the configured sink, or a [`NoopSink`] with a warning when that
    /// fails. The webhook token is read from the environment.
    pub fn build_or_noop(&self) -> Box<dyn TelemetrySink> {
        self.build_or_noop_with_token(std::env::var(TOKEN_ENV).ok())
    }

    pub fn build_or_noop_with_token(&self, token: Option<String>) -> Box<dyn TelemetrySink> {
        match self.build_with_token(token) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Telemetry disabled for this run: {}", e);
                Box::new(NoopSink)
            }
        }
    }

    pub fn build_with_token(&self, token: Option<String>) -> SweepResult<Box<dyn TelemetrySink>> {
        let mut sinks: Vec<Box<dyn TelemetrySink>> = Vec::new();

        if let Some(ref path) = self.json_lines {
            sinks.push(Box::new(JsonLinesSink::new(path)));
        }

        if let Some(ref url) = self.webhook_url {
            match token.filter(|t| !t.trim().is_empty()) {
                Some(token) => {
                    let webhook: Box<dyn TelemetrySink> = Box::new(WebhookSink::new(url, token)?);
                    sinks.push(match self.backup {
                        Some(ref backup) => {
                            Box::new(FallbackSink::new(webhook, JsonLinesSink::new(backup)))
                        }
                        None => webhook,
                    });
                }
                None => warn!(
                    "{} is not set; webhook telemetry to {} is disabled",
                    TOKEN_ENV, url
                ),
            }
        }

        Ok(match sinks.len() {
            0 => Box::new(NoopSink),
            1 => sinks.remove(0),
            _ => Box::new(MultiSink::new(sinks)),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scan::Expansion;

    pub(crate) fn sample_record(job_name: &str) -> TelemetryRecord {
        TelemetryRecord {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_name: job_name.to_string(),
            index: 0,
            parameters: serde_json::json!({"temperature": 100}),
            resources: None,
            success: true,
            job_id: Some("1000".into()),
            continuation_ids: Vec::new(),
            error: None,
        }
    }

    struct FailingSink;

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn record(&self, _record: &TelemetryRecord) -> SweepResult<()> {
            Err(SweepError::Telemetry("service unavailable".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_fallback_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.jsonl");
        let sink = FallbackSink::new(Box::new(FailingSink), JsonLinesSink::new(&backup));

        sink.record(&sample_record("scan_0")).await.unwrap();
        sink.record(&sample_record("scan_1")).await.unwrap();

        let rows = JsonLinesSink::new(&backup).read_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].job_name, "scan_1");
    }

    #[tokio::test]
    async fn test_multi_sink_tries_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.jsonl");
        let sink = MultiSink::new(vec![Box::new(FailingSink), Box::new(JsonLinesSink::new(&log))]);

        assert!(sink.record(&sample_record("scan_0")).await.is_err());
        assert_eq!(JsonLinesSink::new(&log).read_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_build_without_token_is_noop() {
        let config = TelemetryConfig {
            webhook_url: Some("https://example.org/hook".into()),
            ..TelemetryConfig::default()
        };
        assert_eq!(config.build_with_token(None).unwrap().name(), "noop");
        assert_eq!(
            config.build_with_token(Some("secret".into())).unwrap().name(),
            "webhook"
        );

        let config = TelemetryConfig {
            backup: Some("backup.jsonl".into()),
            ..config
        };
        assert_eq!(
            config.build_with_token(Some("secret".into())).unwrap().name(),
            "fallback"
        );

        let config = TelemetryConfig {
            json_lines: Some("log.jsonl".into()),
            ..config
        };
        assert_eq!(
            config.build_with_token(Some("secret".into())).unwrap().name(),
            "multi"
        );
    }

    #[test]
    fn test_webhook_url_validation() {
        let good = TelemetryConfig {
            webhook_url: Some("https://example.org/hook".into()),
            ..TelemetryConfig::default()
        };
        assert!(good.validate().is_ok());
        assert!(TelemetryConfig::default().validate().is_ok());

        for url in ["not a url", "ftp://example.org/hook"] {
            let config = TelemetryConfig {
                webhook_url: Some(url.into()),
                ..TelemetryConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SweepError::Configuration(_)), "{url}");
        }
    }

    #[test]
    fn test_failed_build_falls_back_to_noop() {
        let config = TelemetryConfig {
            webhook_url: Some("not a url".into()),
            ..TelemetryConfig::default()
        };
        assert!(config.build_with_token(Some("secret".into())).is_err());
        let sink = config.build_or_noop_with_token(Some("secret".into()));
        assert_eq!(sink.name(), "noop");
    }

    #[test]
    fn test_record_from_outcome() {
        let combo = Expansion::single().get(0).unwrap();
        let outcome = SubmissionOutcome::failed(combo, "run_0".into(), None, "boom".into());
        let record = TelemetryRecord::from_outcome(Uuid::new_v4(), &outcome).unwrap();
        assert!(!record.success);
        assert_eq!(record.parameters, serde_json::json!({}));
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
