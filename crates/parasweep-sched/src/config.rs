//! Run configuration: YAML document validated once into [`RunConfig`].
//!
//! Every presence, type and range check happens here, before any job is
//! built. Anything that gets past [`RunConfig::from_yaml_str`] can only fail
//! per job.

use std::path::Path;

use serde::Deserialize;

use crate::cluster::ClusterProfile;
use crate::error::{SweepError, SweepResult};
use crate::job::{BaseConfig, SubmissionOptions, check_arguments, check_job_name_length};
use crate::resources::WorkloadHint;
use crate::scan::{Expansion, ScanSpecification};
use crate::telemetry::TelemetryConfig;

/// Document as written by the user.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunConfig {
    base: BaseConfig,
    #[serde(default)]
    scan: Option<ScanSpecification>,
    /// Built-in profile name or inline profile table.
    cluster: serde_yaml_ng::Value,
    #[serde(default)]
    workload: WorkloadHint,
    #[serde(default)]
    submission: SubmissionOptions,
    #[serde(default)]
    telemetry: TelemetryConfig,
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base: BaseConfig,
    pub scan: Option<ScanSpecification>,
    /// Expansion of `scan`, or a single parameterless job without one.
    pub expansion: Expansion,
    pub cluster: ClusterProfile,
    pub workload: WorkloadHint,
    pub submission: SubmissionOptions,
    pub telemetry: TelemetryConfig,
}

impl RunConfig {
    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> SweepResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SweepError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> SweepResult<Self> {
        let raw: RawRunConfig = serde_yaml_ng::from_str(contents)
            .map_err(|e| SweepError::config(format!("invalid run configuration: {e}")))?;
        let cluster = resolve_cluster(raw.cluster)?;
        Self::new(
            raw.base,
            raw.scan,
            cluster,
            raw.workload,
            raw.submission,
            raw.telemetry,
        )
    }

    /// Validate already-typed parts.
    pub fn new(
        base: BaseConfig,
        scan: Option<ScanSpecification>,
        cluster: ClusterProfile,
        workload: WorkloadHint,
        submission: SubmissionOptions,
        telemetry: TelemetryConfig,
    ) -> SweepResult<Self> {
        base.validate()?;
        cluster.validate()?;
        workload.validate()?;
        telemetry.validate()?;

        let expansion = match scan {
            Some(ref spec) => spec.expand()?,
            None => Expansion::single(),
        };
        check_job_name_length(&base.run_name, expansion.len())?;
        let names: Vec<&str> = expansion.axes().iter().map(|a| a.name.as_str()).collect();
        check_arguments(&base, &names)?;

        if submission.email.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(SweepError::config("submission.email must not be empty"));
        }

        Ok(Self {
            base,
            scan,
            expansion,
            cluster,
            workload,
            submission,
            telemetry,
        })
    }

    /// Number of jobs the run expands to.
    pub fn job_count(&self) -> usize {
        self.expansion.len()
    }
}

fn resolve_cluster(value: serde_yaml_ng::Value) -> SweepResult<ClusterProfile> {
    match value {
        serde_yaml_ng::Value::String(name) => ClusterProfile::builtin(&name).ok_or_else(|| {
            SweepError::config(format!(
                "unknown cluster '{}': expected one of {} or an inline profile",
                name,
                ClusterProfile::builtin_names().join(", ")
            ))
        }),
        value @ serde_yaml_ng::Value::Mapping(_) => serde_yaml_ng::from_value(value)
            .map_err(|e| SweepError::config(format!("invalid cluster profile: {e}"))),
        _ => Err(SweepError::config(
            "cluster must be a built-in profile name or a table",
        )),
    }
}
