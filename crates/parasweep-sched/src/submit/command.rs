//! Submission through the scheduler's command-line tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::error::{SweepError, SweepResult};
use crate::render::SchedulerVariant;

use super::parser;
use super::{SubmissionRequest, SubmissionResponse, Submitter};

/// Grace period on top of the wall-time for local shell runs.
const SHELL_GRACE: Duration = Duration::from_secs(60);

/// Writes the script into the job's working directory and runs the
/// variant's submit command on it.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    /// Limit for the submit command itself.
    timeout: Duration,
}

impl Default for CommandSubmitter {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl CommandSubmitter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A local shell run executes the whole job, so it may take as long as
    /// its wall-time.
    fn limit_for(&self, request: &SubmissionRequest) -> Duration {
        match request.variant {
            SchedulerVariant::Shell => {
                Duration::from_secs(request.wall_time.as_secs()) + SHELL_GRACE
            }
            _ => self.timeout,
        }
    }

    fn arguments(request: &SubmissionRequest) -> SweepResult<Vec<String>> {
        let command = request.variant.submit_command();
        let mut args = Vec::new();
        if let Some(ref dependency) = request.depends_on {
            let extra = request.variant.dependency_args(dependency).ok_or_else(|| {
                SweepError::SubmissionFailure {
                    command: command.to_string(),
                    message: format!(
                        "{} cannot wait for job {dependency}",
                        request.variant
                    ),
                }
            })?;
            args.extend(extra);
        }
        args.push(request.script_path.to_string_lossy().into_owned());
        Ok(args)
    }
}

#[async_trait]
impl Submitter for CommandSubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> SweepResult<SubmissionResponse> {
        let command = request.variant.submit_command();
        let args = Self::arguments(request)?;

        fs::create_dir_all(&request.work_dir).await?;
        fs::write(&request.script_path, &request.script).await?;
        debug!(
            "Wrote {} ({} bytes)",
            request.script_path.display(),
            request.script.len()
        );

        let limit = self.limit_for(request);
        let output = tokio::time::timeout(
            limit,
            Command::new(command)
                .args(&args)
                .current_dir(&request.work_dir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SweepError::Timeout(format!("{command} timed out after {}s", limit.as_secs())))?
        .map_err(|e| SweepError::SubmissionFailure {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(SweepError::SubmissionFailure {
                command: command.to_string(),
                message,
            });
        }

        let job_id = parser::parse_job_id(request.variant, &stdout)?;
        let output = match request.variant {
            SchedulerVariant::Shell => format!("{}{}", stdout, output.status),
            _ => stdout,
        };
        Ok(SubmissionResponse { job_id, output })
    }

    fn name(&self) -> &str {
        "command"
    }
}
