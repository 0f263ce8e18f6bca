//! Error handling for sweep expansion, allocation, rendering and submission.

use thiserror::Error;

/// Result type for sweep operations.
pub type SweepResult<T> = Result<T, SweepError>;

/// Errors that can occur while turning a run configuration into submitted jobs.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Malformed or incomplete scan or base configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No allocation satisfies the workload under the cluster ceilings.
    #[error("Resource request unsatisfiable on {cluster}: {reason}")]
    ResourceUnsatisfiable { cluster: String, reason: String },

    /// A value cannot be represented in the target scheduler's directive syntax.
    #[error("{variant} render error: {message}")]
    Render { variant: String, message: String },

    /// The submission command rejected the script or could not be run.
    #[error("Submission failed: {command} - {message}")]
    SubmissionFailure { command: String, message: String },

    /// Timeout waiting for the submission command.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Telemetry sink failure. Never propagated out of the orchestrator.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SweepError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SweepError::Configuration(message.into())
    }

    /// Shorthand for a render error against the named variant.
    pub fn render(variant: impl Into<String>, message: impl Into<String>) -> Self {
        SweepError::Render {
            variant: variant.into(),
            message: message.into(),
        }
    }

    /// Whether the error only affects the job it was raised for.
    ///
    /// Configuration errors abort the whole run; everything a single job can
    /// hit on its way to the scheduler is recorded and the sweep moves on.
    pub fn is_per_job(&self) -> bool {
        matches!(
            self,
            SweepError::ResourceUnsatisfiable { .. }
                | SweepError::Render { .. }
                | SweepError::SubmissionFailure { .. }
                | SweepError::Timeout(_)
                | SweepError::Io(_)
        )
    }
}

impl From<reqwest::Error> for SweepError {
    fn from(e: reqwest::Error) -> Self {
        SweepError::Telemetry(e.to_string())
    }
}
