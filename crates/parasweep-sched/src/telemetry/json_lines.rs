//! Local append-only JSON-lines log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::SweepResult;

use super::{TelemetryRecord, TelemetrySink};

/// One JSON object per line, appended to `path`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row back, skipping lines that do not parse.
    pub async fn read_all(&self) -> SweepResult<Vec<TelemetryRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<TelemetryRecord>(line) {
                Ok(row) => rows.push(row),
                Err(e) => tracing::warn!("Skipping malformed row in {}: {}", self.path.display(), e),
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl TelemetrySink for JsonLinesSink {
    async fn record(&self, record: &TelemetryRecord) -> SweepResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}
