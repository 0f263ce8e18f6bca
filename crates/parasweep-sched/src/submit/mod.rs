//! Handing rendered scripts to a scheduler.
//!
//! The [`Submitter`] trait is the seam between the orchestrator and the
//! outside world: [`CommandSubmitter`] runs `sbatch`/`qsub`/`llsubmit`/`bash`
//! as a subprocess, [`DryRunSubmitter`] records requests and hands out
//! synthetic ids.

mod command;
mod dry_run;
pub mod parser;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SweepResult;
use crate::job::JobDefinition;
use crate::render::SchedulerVariant;
use crate::units::WallTime;

pub use command::CommandSubmitter;
pub use dry_run::{DryRunRecord, DryRunSubmitter};

/// One script ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRequest {
    pub job_name: String,
    pub variant: SchedulerVariant,
    /// Script text.
    pub script: String,
    /// Where the script is written before submission.
    pub script_path: PathBuf,
    pub work_dir: PathBuf,
    /// Continuation segment; 0 for the initial submission.
    pub segment: u32,
    /// Scheduler id of the segment this one must wait for.
    pub depends_on: Option<String>,
    /// Wall-time of the job, used to bound local shell runs.
    pub wall_time: WallTime,
}

impl SubmissionRequest {
    /// Request for segment `segment` of `job`.
    pub fn for_job(
        job: &JobDefinition,
        variant: SchedulerVariant,
        script: String,
        segment: u32,
        depends_on: Option<String>,
    ) -> Self {
        let file_name = if segment == 0 {
            format!("{}{}", job.name, variant.script_extension())
        } else {
            format!("{}.seg{}{}", job.name, segment, variant.script_extension())
        };
        Self {
            job_name: job.name.clone(),
            variant,
            script,
            script_path: job.work_dir.join(file_name),
            work_dir: job.work_dir.clone(),
            segment,
            depends_on,
            wall_time: job.resources.wall_time,
        }
    }
}

/// What the submission collaborator reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResponse {
    /// Scheduler-assigned id; `None` for local shell runs.
    pub job_id: Option<String>,
    /// Raw command output.
    pub output: String,
}

/// Accepts a script and returns the scheduler's answer.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit one script.
    async fn submit(&self, request: &SubmissionRequest) -> SweepResult<SubmissionResponse>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::sample_job;

    #[test]
    fn test_request_paths() {
        let job = sample_job();
        let request =
            SubmissionRequest::for_job(&job, SchedulerVariant::Slurm, String::new(), 0, None);
        assert_eq!(
            request.script_path,
            PathBuf::from("/scratch/runs/tscan_1/tscan_1.slurm")
        );

        let request = SubmissionRequest::for_job(
            &job,
            SchedulerVariant::Pbs,
            String::new(),
            2,
            Some("41.cumulus".into()),
        );
        assert_eq!(
            request.script_path,
            PathBuf::from("/scratch/runs/tscan_1/tscan_1.seg2.pbs")
        );
        assert_eq!(request.wall_time, WallTime::from_hours(8));
    }
}
