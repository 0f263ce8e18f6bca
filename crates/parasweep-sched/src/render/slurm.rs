//! Slurm batch script header.

use crate::error::{SweepError, SweepResult};
use crate::job::{EmailEvents, JobDefinition};
use crate::units::WallTime;

use super::LogPaths;
use super::escape::{check_directive_path, check_job_name, check_token};

const VARIANT: &str = "slurm";

/// Slurm stores limits in whole minutes; `u32::MAX` means unlimited.
const MAX_TIME_MINUTES: u64 = u32::MAX as u64 - 1;

pub(super) fn header(job: &JobDefinition, logs: &LogPaths) -> SweepResult<String> {
    let resources = &job.resources;
    let mut script = String::new();

    // Shebang
    script.push_str("#!/bin/bash\n");

    // SLURM directives
    script.push_str(&format!(
        "#SBATCH --job-name={}\n",
        check_job_name(VARIANT, &job.name)?
    ));
    script.push_str(&format!("#SBATCH --nodes={}\n", resources.nodes));
    script.push_str(&format!(
        "#SBATCH --ntasks-per-node={}\n",
        resources.cores_per_node
    ));
    script.push_str(&format!(
        "#SBATCH --time={}\n",
        format_time(resources.wall_time)?
    ));
    script.push_str(&format!(
        "#SBATCH --output={}\n",
        check_directive_path(VARIANT, &logs.out)?
    ));
    script.push_str(&format!(
        "#SBATCH --error={}\n",
        check_directive_path(VARIANT, &logs.err)?
    ));

    if let Some(ref queue) = resources.queue {
        check_token(VARIANT, "partition", queue)?;
        script.push_str(&format!("#SBATCH --partition={}\n", queue));
    }
    if let Some(ref qos) = job.options.qos {
        check_token(VARIANT, "qos", qos)?;
        script.push_str(&format!("#SBATCH --qos={}\n", qos));
    }
    if let Some(ref account) = job.options.account {
        check_token(VARIANT, "account", account)?;
        script.push_str(&format!("#SBATCH --account={}\n", account));
    }
    if let Some(memory) = resources.memory_per_node {
        script.push_str(&format!("#SBATCH --mem={}M\n", memory.as_mb()));
    }
    if let Some(ref email) = job.options.email {
        script.push_str(&format!("#SBATCH --mail-user={}\n", email));
        script.push_str(&format!(
            "#SBATCH --mail-type={}\n",
            mail_type(job.options.email_events)
        ));
    }

    Ok(script)
}

/// `D-HH:MM:SS`, or `HH:MM:SS` below one day.
fn format_time(wall_time: WallTime) -> SweepResult<String> {
    if wall_time.is_zero() {
        return Err(SweepError::render(VARIANT, "wall-time must be positive"));
    }
    if wall_time.as_secs().div_ceil(60) > MAX_TIME_MINUTES {
        return Err(SweepError::render(
            VARIANT,
            format!("wall-time {wall_time} exceeds the largest finite --time value"),
        ));
    }
    Ok(wall_time.to_string())
}

fn mail_type(events: EmailEvents) -> &'static str {
    match events {
        EmailEvents::All => "ALL",
        EmailEvents::Begin => "BEGIN",
        EmailEvents::End => "END",
        EmailEvents::Fail => "FAIL",
        EmailEvents::None => "NONE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SubmissionOptions;
    use crate::render::tests::sample_job;
    use crate::render::{SchedulerVariant, render};

    #[test]
    fn test_slurm_script() {
        let job = sample_job().with_options(SubmissionOptions {
            account: Some("FUSIO_ru3CCFE".into()),
            qos: Some("normal".into()),
            email: Some("me@example.org".into()),
            email_events: EmailEvents::Fail,
        });
        let script = render(&job, SchedulerVariant::Slurm).unwrap();

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#SBATCH --job-name=tscan_1\n"));
        assert!(script.contains("#SBATCH --nodes=2\n"));
        assert!(script.contains("#SBATCH --ntasks-per-node=48\n"));
        assert!(script.contains("#SBATCH --time=08:00:00\n"));
        assert!(script.contains("#SBATCH --output=/scratch/runs/tscan_1/tscan_1.out\n"));
        assert!(script.contains("#SBATCH --partition=skl_fua_prod\n"));
        assert!(script.contains("#SBATCH --qos=normal\n"));
        assert!(script.contains("#SBATCH --account=FUSIO_ru3CCFE\n"));
        assert!(script.contains("#SBATCH --mem=20480M\n"));
        assert!(script.contains("#SBATCH --mail-user=me@example.org\n"));
        assert!(script.contains("#SBATCH --mail-type=FAIL\n"));
        assert!(script.contains("echo \"Job ID: $SLURM_JOB_ID\""));
    }

    #[test]
    fn test_no_optional_directives() {
        let mut job = sample_job();
        job.resources.queue = None;
        job.resources.memory_per_node = None;
        let script = render(&job, SchedulerVariant::Slurm).unwrap();
        assert!(!script.contains("--partition"));
        assert!(!script.contains("--mem"));
        assert!(!script.contains("--mail-user"));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(WallTime::from_minutes(30)).unwrap(), "00:30:00");
        assert_eq!(format_time(WallTime::from_hours(48)).unwrap(), "2-00:00:00");
        assert!(format_time(WallTime::from_secs(0)).is_err());
        assert!(format_time(WallTime::from_minutes(u64::from(u32::MAX))).is_err());
    }

    #[test]
    fn test_rejects_injected_partition() {
        let mut job = sample_job();
        job.resources.queue = Some("prod\n#SBATCH --exclusive".into());
        let err = render(&job, SchedulerVariant::Slurm).unwrap_err();
        assert!(matches!(err, SweepError::Render { .. }));
    }
}
