//! PBS/Torque batch script header.

use crate::error::{SweepError, SweepResult};
use crate::job::{EmailEvents, JobDefinition};
use crate::units::WallTime;

use super::LogPaths;
use super::escape::{check_directive_path, check_job_name, check_token};

const VARIANT: &str = "pbs";

/// Torque keeps resource limits in a signed 32-bit seconds counter.
const MAX_WALLTIME_SECS: u64 = i32::MAX as u64;

pub(super) fn header(job: &JobDefinition, logs: &LogPaths) -> SweepResult<String> {
    let resources = &job.resources;
    let mut script = String::new();

    // Shebang
    script.push_str("#!/bin/bash\n");

    // PBS directives
    script.push_str(&format!("#PBS -N {}\n", check_job_name(VARIANT, &job.name)?));
    script.push_str(&format!(
        "#PBS -l nodes={}:ppn={}\n",
        resources.nodes, resources.cores_per_node
    ));
    script.push_str(&format!(
        "#PBS -l walltime={}\n",
        format_walltime(resources.wall_time)?
    ));
    script.push_str(&format!(
        "#PBS -o {}\n",
        check_directive_path(VARIANT, &logs.out)?
    ));
    script.push_str(&format!(
        "#PBS -e {}\n",
        check_directive_path(VARIANT, &logs.err)?
    ));
    script.push_str(&format!(
        "#PBS -d {}\n",
        check_directive_path(VARIANT, &job.work_dir)?
    ));

    if let Some(ref queue) = resources.queue {
        check_token(VARIANT, "queue", queue)?;
        script.push_str(&format!("#PBS -q {}\n", queue));
    }
    if let Some(ref account) = job.options.account {
        check_token(VARIANT, "account", account)?;
        script.push_str(&format!("#PBS -A {}\n", account));
    }
    // Torque has no per-node memory limit; request the job total.
    if let Some(memory) = resources.memory_per_node {
        let total = memory.saturating_mul(resources.nodes);
        script.push_str(&format!("#PBS -l mem={}mb\n", total.as_mb()));
    }
    if let Some(ref email) = job.options.email {
        script.push_str(&format!("#PBS -M {}\n", email));
        script.push_str(&format!(
            "#PBS -m {}\n",
            mail_options(job.options.email_events)
        ));
    }

    // Export current environment
    script.push_str("#PBS -V\n");

    Ok(script)
}

/// `HH:MM:SS` with unbounded hours.
fn format_walltime(wall_time: WallTime) -> SweepResult<String> {
    if wall_time.is_zero() {
        return Err(SweepError::render(VARIANT, "walltime must be positive"));
    }
    if wall_time.as_secs() > MAX_WALLTIME_SECS {
        return Err(SweepError::render(
            VARIANT,
            format!(
                "walltime of {} seconds exceeds the {MAX_WALLTIME_SECS} second limit",
                wall_time.as_secs()
            ),
        ));
    }
    let (hours, minutes, seconds) = wall_time.hms();
    Ok(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

fn mail_options(events: EmailEvents) -> &'static str {
    match events {
        EmailEvents::All => "abe",
        EmailEvents::Begin => "b",
        EmailEvents::End => "e",
        EmailEvents::Fail => "a",
        EmailEvents::None => "n",
    }
}
