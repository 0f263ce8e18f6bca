//! Submission script rendering.
//!
//! [`render`] is a pure function of a [`JobDefinition`] and a
//! [`SchedulerVariant`]: the same inputs always give byte-identical text.
//! Each variant writes its own directive header; the shell body (module
//! preamble, parameter exports, staging and the executable call) is shared.
//!
//! Values that a directive cannot carry are rejected with
//! [`SweepError::Render`] rather than coerced.

pub mod escape;
mod loadleveler;
mod pbs;
mod shell;
mod slurm;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};
use crate::job::JobDefinition;

use self::escape::{check_email, check_module, quote, quote_path};

/// Environment variable carrying the continuation segment number.
pub const SEGMENT_ENV: &str = "PARASWEEP_SEGMENT";

/// Environment variable carrying the seconds the executable may run before
/// it should write its output.
pub const SAFE_WALL_TIME_ENV: &str = "PARASWEEP_SAFE_WALL_TIME";

/// Scheduler dialect a script is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerVariant {
    Slurm,
    Pbs,
    #[serde(alias = "loadleveller")]
    LoadLeveler,
    /// Plain shell script run directly on the local machine.
    Shell,
}

impl SchedulerVariant {
    pub const ALL: [SchedulerVariant; 4] = [
        SchedulerVariant::Slurm,
        SchedulerVariant::Pbs,
        SchedulerVariant::LoadLeveler,
        SchedulerVariant::Shell,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchedulerVariant::Slurm => "slurm",
            SchedulerVariant::Pbs => "pbs",
            SchedulerVariant::LoadLeveler => "loadleveler",
            SchedulerVariant::Shell => "shell",
        }
    }

    pub fn script_extension(&self) -> &'static str {
        match self {
            SchedulerVariant::Slurm => ".slurm",
            SchedulerVariant::Pbs => ".pbs",
            SchedulerVariant::LoadLeveler => ".ll",
            SchedulerVariant::Shell => ".sh",
        }
    }

    /// Program that accepts the script path.
    pub fn submit_command(&self) -> &'static str {
        match self {
            SchedulerVariant::Slurm => "sbatch",
            SchedulerVariant::Pbs => "qsub",
            SchedulerVariant::LoadLeveler => "llsubmit",
            SchedulerVariant::Shell => "bash",
        }
    }

    /// Whether a submission can wait for an earlier job to end.
    pub fn supports_dependencies(&self) -> bool {
        matches!(self, SchedulerVariant::Slurm | SchedulerVariant::Pbs)
    }

    /// Extra submit-command arguments that start a job after `job_id` ends,
    /// whatever its exit state.
    pub fn dependency_args(&self, job_id: &str) -> Option<Vec<String>> {
        match self {
            SchedulerVariant::Slurm => Some(vec![format!("--dependency=afterany:{job_id}")]),
            SchedulerVariant::Pbs => Some(vec![
                "-W".to_string(),
                format!("depend=afterany:{job_id}"),
            ]),
            SchedulerVariant::LoadLeveler | SchedulerVariant::Shell => None,
        }
    }

    /// Shell variable holding the scheduler's id for the running job.
    fn job_id_var(&self) -> &'static str {
        match self {
            SchedulerVariant::Slurm => "$SLURM_JOB_ID",
            SchedulerVariant::Pbs => "$PBS_JOBID",
            SchedulerVariant::LoadLeveler => "$LOADL_STEP_ID",
            SchedulerVariant::Shell => "$$",
        }
    }
}

impl fmt::Display for SchedulerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchedulerVariant {
    type Err = SweepError;

    fn from_str(s: &str) -> SweepResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slurm" => Ok(SchedulerVariant::Slurm),
            "pbs" | "torque" => Ok(SchedulerVariant::Pbs),
            "loadleveler" | "loadleveller" => Ok(SchedulerVariant::LoadLeveler),
            "shell" | "bash" => Ok(SchedulerVariant::Shell),
            other => Err(SweepError::config(format!(
                "unknown scheduler '{other}': expected slurm, pbs, loadleveler or shell"
            ))),
        }
    }
}

/// Log file locations for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogPaths {
    pub out: PathBuf,
    pub err: PathBuf,
}

impl LogPaths {
    fn for_segment(job: &JobDefinition, segment: u32) -> Self {
        let stem = if segment == 0 {
            job.name.clone()
        } else {
            format!("{}.seg{}", job.name, segment)
        };
        Self {
            out: job.work_dir.join(format!("{stem}.out")),
            err: job.work_dir.join(format!("{stem}.err")),
        }
    }
}

/// Render the first (or only) segment of `job`.
pub fn render(job: &JobDefinition, variant: SchedulerVariant) -> SweepResult<String> {
    render_segment(job, variant, 0)
}

/// Render continuation segment `segment` of `job`; segment 0 is the
/// initial submission.
pub fn render_segment(
    job: &JobDefinition,
    variant: SchedulerVariant,
    segment: u32,
) -> SweepResult<String> {
    let name = variant.name();
    if segment >= job.segments() {
        return Err(SweepError::render(
            name,
            format!(
                "segment {segment} requested but job {} has {} segment(s)",
                job.name,
                job.segments()
            ),
        ));
    }
    if job.resources.continuations > 0 && !variant.supports_dependencies() {
        return Err(SweepError::render(
            name,
            format!(
                "job {} needs {} chained segments but {name} cannot express job dependencies",
                job.name,
                job.segments()
            ),
        ));
    }
    if job.options.qos.is_some() && variant != SchedulerVariant::Slurm {
        return Err(SweepError::render(name, "qos is only supported by slurm"));
    }
    for module in &job.modules {
        check_module(name, module)?;
    }
    // No shell can carry a NUL byte, quoted or not.
    if let Some((param, _)) = job
        .parameters
        .values()
        .iter()
        .find(|(_, value)| value.to_string().contains('\0'))
    {
        return Err(SweepError::render(
            name,
            format!("value of parameter '{param}' contains a NUL byte"),
        ));
    }
    if job.arguments.iter().any(|arg| arg.contains('\0')) {
        return Err(SweepError::render(name, "argument contains a NUL byte"));
    }
    if let Some(ref email) = job.options.email {
        check_email(name, email)?;
    }

    let logs = LogPaths::for_segment(job, segment);
    let mut script = match variant {
        SchedulerVariant::Slurm => slurm::header(job, &logs)?,
        SchedulerVariant::Pbs => pbs::header(job, &logs)?,
        SchedulerVariant::LoadLeveler => loadleveler::header(job, &logs)?,
        SchedulerVariant::Shell => shell::header(job)?,
    };
    write_body(&mut script, job, variant, segment, &logs);
    Ok(script)
}

fn write_body(
    script: &mut String,
    job: &JobDefinition,
    variant: SchedulerVariant,
    segment: u32,
    logs: &LogPaths,
) {
    // Environment setup
    script.push_str("\n# Environment setup\n");
    script.push_str("set -e\n");
    script.push_str("set -o pipefail\n\n");

    if !job.modules.is_empty() {
        script.push_str("# Load required modules\n");
        for module in &job.modules {
            script.push_str(&format!("module load {}\n", module));
        }
        script.push('\n');
    }

    script.push_str("# Scan parameters\n");
    for (key, value) in job.environment() {
        script.push_str(&format!("export {}={}\n", key, quote(&value)));
    }
    script.push_str(&format!("export {}={}\n", SEGMENT_ENV, segment));
    script.push_str(&format!(
        "export {}={}\n\n",
        SAFE_WALL_TIME_ENV,
        job.resources.safe_wall_time.as_secs()
    ));

    script.push_str("# Working directory\n");
    script.push_str(&format!("cd {}\n", quote_path(&job.work_dir)));
    if segment == 0 {
        if let Some(ref template_dir) = job.template_dir {
            script.push_str(&format!("cp -R {}/. .\n", quote_path(template_dir)));
        }
    }
    if variant == SchedulerVariant::Shell {
        script.push_str(&format!(
            "exec > {} 2> {}\n",
            quote_path(&logs.out),
            quote_path(&logs.err)
        ));
    }
    script.push('\n');

    // Job information
    script.push_str("# Job information\n");
    script.push_str(&format!("echo \"Job ID: {}\"\n", variant.job_id_var()));
    script.push_str(&format!(
        "echo {}\n",
        quote(&format!("Job Name: {}", job.name))
    ));
    script.push_str(&format!(
        "echo \"Segment: {} of {}\"\n",
        segment + 1,
        job.segments()
    ));
    script.push_str("echo \"Start Time: $(date)\"\n\n");

    script.push_str("# Run\n");
    let mut command: Vec<String> = Vec::with_capacity(job.arguments.len() + 3);
    if variant == SchedulerVariant::Shell {
        command.push("timeout".to_string());
        command.push(job.resources.wall_time.as_secs().to_string());
    }
    command.push(quote_path(&job.executable));
    command.extend(job.arguments.iter().map(|arg| quote(arg)));
    script.push_str(&command.join(" "));
    script.push('\n');

    script.push_str("\necho \"Job completed at: $(date)\"\n");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::job::{BaseConfig, SubmissionOptions};
    use crate::resources::ResourceRequest;
    use crate::scan::{Axis, ParamValue, ScanMode, ScanSpecification};
    use crate::units::{Memory, WallTime};

    pub(crate) fn sample_job() -> JobDefinition {
        let combo = ScanSpecification::new(ScanMode::Product)
            .with_axis(
                "temperature",
                Axis::List(vec![ParamValue::Int(100), ParamValue::Int(200)]),
            )
            .with_axis("label", Axis::Scalar(ParamValue::Text("it's; rm -rf /".into())))
            .expand()
            .unwrap()
            .get(1)
            .unwrap();
        let base = BaseConfig::new("tscan", "/opt/spice/bin/spice", "/scratch/runs")
            .with_arguments(["-t", "{temperature}"])
            .with_modules(["intel/2020", "openmpi/4.0"])
            .with_template_dir("/home/me/templates");
        let resources = ResourceRequest {
            nodes: 2,
            cores_per_node: 48,
            memory_per_node: Some(Memory::from_gb(20)),
            wall_time: WallTime::from_hours(8),
            safe_wall_time: WallTime::from_secs(25_920),
            queue: Some("skl_fua_prod".into()),
            continuations: 0,
        };
        JobDefinition::build(combo, &base, resources).unwrap()
    }

    pub(crate) fn local_job() -> JobDefinition {
        let mut job = sample_job();
        job.resources.nodes = 1;
        job.resources.queue = None;
        job
    }

    #[test]
    fn test_render_is_deterministic() {
        let job = sample_job();
        for variant in [
            SchedulerVariant::Slurm,
            SchedulerVariant::Pbs,
            SchedulerVariant::LoadLeveler,
        ] {
            let first = render(&job, variant).unwrap();
            let second = render(&job, variant).unwrap();
            assert_eq!(first, second);
        }
        assert_eq!(
            render(&local_job(), SchedulerVariant::Shell).unwrap(),
            render(&local_job(), SchedulerVariant::Shell).unwrap()
        );
    }

    #[test]
    fn test_body_escapes_parameter_values() {
        let script = render(&sample_job(), SchedulerVariant::Slurm).unwrap();
        assert!(script.contains("export PARAM_TEMPERATURE='200'\n"));
        assert!(script.contains("export PARAM_LABEL='it'\\''s; rm -rf /'\n"));
        assert!(script.contains("export PARASWEEP_SEGMENT=0\n"));
        assert!(script.contains("export PARASWEEP_SAFE_WALL_TIME=25920\n"));
        assert!(script.contains("'/opt/spice/bin/spice' '-t' '200'\n"));
        assert!(script.contains("module load intel/2020\n"));
        assert!(script.contains("cd '/scratch/runs/tscan_1'\n"));
        assert!(script.contains("cp -R '/home/me/templates'/. .\n"));
        assert!(script.contains("set -o pipefail"));
    }

    #[test]
    fn test_continuations_need_dependency_support() {
        let mut job = sample_job();
        job.resources.continuations = 2;
        assert!(render_segment(&job, SchedulerVariant::Slurm, 2).is_ok());
        assert!(render_segment(&job, SchedulerVariant::Slurm, 3).is_err());

        let err = render(&job, SchedulerVariant::LoadLeveler).unwrap_err();
        assert!(matches!(err, SweepError::Render { .. }));

        let continuation = render_segment(&job, SchedulerVariant::Pbs, 1).unwrap();
        assert!(continuation.contains("export PARASWEEP_SEGMENT=1\n"));
        assert!(!continuation.contains("cp -R"));
        assert!(continuation.contains("tscan_1.seg1.out"));
    }

    #[test]
    fn test_qos_only_on_slurm() {
        let job = sample_job().with_options(SubmissionOptions {
            qos: Some("normal".into()),
            ..SubmissionOptions::default()
        });
        assert!(render(&job, SchedulerVariant::Slurm).is_ok());
        assert!(render(&job, SchedulerVariant::Pbs).is_err());
        assert!(render(&job, SchedulerVariant::LoadLeveler).is_err());
    }

    #[test]
    fn test_nul_in_parameter_rejected() {
        let mut job = sample_job();
        job.arguments.push("a\0b".into());
        let err = render(&job, SchedulerVariant::Slurm).unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn test_overlong_job_name_is_not_truncated() {
        let mut first = sample_job();
        let mut second = sample_job();
        first.name = format!("{}_0", "r".repeat(70));
        second.name = format!("{}_1", "r".repeat(70));
        for variant in [
            SchedulerVariant::Slurm,
            SchedulerVariant::Pbs,
            SchedulerVariant::LoadLeveler,
        ] {
            for job in [&first, &second] {
                let err = render(job, variant).unwrap_err();
                assert!(matches!(err, SweepError::Render { .. }), "{variant:?}");
            }
        }

        let mut spaced = sample_job();
        spaced.name = "t scan_1".into();
        assert!(render(&spaced, SchedulerVariant::Pbs).is_err());
    }

    #[test]
    fn test_bad_module_rejected() {
        let mut job = sample_job();
        job.modules.push("intel\nrm -rf /".into());
        assert!(render(&job, SchedulerVariant::Slurm).is_err());
    }

    #[test]
    fn test_variant_metadata() {
        assert_eq!(SchedulerVariant::Slurm.script_extension(), ".slurm");
        assert_eq!(SchedulerVariant::LoadLeveler.submit_command(), "llsubmit");
        assert_eq!(
            SchedulerVariant::Pbs.dependency_args("42.cumulus"),
            Some(vec!["-W".to_string(), "depend=afterany:42.cumulus".to_string()])
        );
        assert!(SchedulerVariant::Shell.dependency_args("1").is_none());
        assert_eq!(
            "LoadLeveller".parse::<SchedulerVariant>().unwrap(),
            SchedulerVariant::LoadLeveler
        );
        let v: SchedulerVariant = serde_yaml_ng::from_str("loadleveller").unwrap();
        assert_eq!(v, SchedulerVariant::LoadLeveler);
    }
}
