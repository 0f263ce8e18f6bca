//! Submitter that never leaves the process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SweepResult;
use crate::render::SchedulerVariant;

use super::{SubmissionRequest, SubmissionResponse, Submitter};

/// What a dry run remembers about one request. The script text is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunRecord {
    pub job_name: String,
    pub variant: SchedulerVariant,
    pub script_path: PathBuf,
    pub segment: u32,
    pub depends_on: Option<String>,
    /// Synthetic scheduler id handed back for this request.
    pub job_id: Option<String>,
}

/// Records every request and answers with a synthetic id.
#[derive(Debug)]
pub struct DryRunSubmitter {
    /// Mock job counter for generating fake job IDs.
    counter: AtomicU64,
    submitted: Mutex<Vec<DryRunRecord>>,
}

impl Default for DryRunSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1000),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in submission order.
    pub async fn submitted(&self) -> Vec<DryRunRecord> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl Submitter for DryRunSubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> SweepResult<SubmissionResponse> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let job_id = match request.variant {
            SchedulerVariant::Shell => None,
            SchedulerVariant::Pbs => Some(format!("{id}.dryrun")),
            SchedulerVariant::Slurm | SchedulerVariant::LoadLeveler => Some(id.to_string()),
        };
        self.submitted.lock().await.push(DryRunRecord {
            job_name: request.job_name.clone(),
            variant: request.variant,
            script_path: request.script_path.clone(),
            segment: request.segment,
            depends_on: request.depends_on.clone(),
            job_id: job_id.clone(),
        });

        let output = match request.depends_on {
            Some(ref dep) => format!(
                "dry run: {} {} (after {})",
                request.variant.submit_command(),
                request.script_path.display(),
                dep
            ),
            None => format!(
                "dry run: {} {}",
                request.variant.submit_command(),
                request.script_path.display()
            ),
        };
        Ok(SubmissionResponse { job_id, output })
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
