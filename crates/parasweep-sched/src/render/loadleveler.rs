//! LoadLeveler job command file header.

use crate::error::{SweepError, SweepResult};
use crate::job::{EmailEvents, JobDefinition};
use crate::units::WallTime;

use super::LogPaths;
use super::escape::{check_directive_path, check_job_name, check_token};

const VARIANT: &str = "loadleveler";

/// Limits are kept as signed 32-bit seconds.
const MAX_WALL_CLOCK_SECS: u64 = i32::MAX as u64;

pub(super) fn header(job: &JobDefinition, logs: &LogPaths) -> SweepResult<String> {
    let resources = &job.resources;
    let mut script = String::new();

    script.push_str("#!/bin/bash\n");

    script.push_str(&format!("# @ job_name = {}\n", check_job_name(VARIANT, &job.name)?));
    if resources.nodes > 1 {
        script.push_str("# @ job_type = parallel\n");
    }
    script.push_str(&format!("# @ node = {}\n", resources.nodes));
    script.push_str(&format!(
        "# @ tasks_per_node = {}\n",
        resources.cores_per_node
    ));
    script.push_str(&format!(
        "# @ wall_clock_limit = {}\n",
        format_limit(resources.wall_time)?
    ));
    script.push_str(&format!(
        "# @ output = {}\n",
        check_directive_path(VARIANT, &logs.out)?
    ));
    script.push_str(&format!(
        "# @ error = {}\n",
        check_directive_path(VARIANT, &logs.err)?
    ));
    script.push_str(&format!(
        "# @ initialdir = {}\n",
        check_directive_path(VARIANT, &job.work_dir)?
    ));

    if let Some(ref class) = resources.queue {
        check_token(VARIANT, "class", class)?;
        script.push_str(&format!("# @ class = {}\n", class));
    }
    if let Some(ref account) = job.options.account {
        check_token(VARIANT, "account", account)?;
        script.push_str(&format!("# @ account_no = {}\n", account));
    }
    if let Some(memory) = resources.memory_per_node {
        script.push_str(&format!(
            "# @ requirements = (Memory >= {})\n",
            memory.as_mb()
        ));
    }
    if let Some(ref email) = job.options.email {
        script.push_str(&format!("# @ notify_user = {}\n", email));
        script.push_str(&format!(
            "# @ notification = {}\n",
            notification(job.options.email_events)
        ));
    }

    // Ends the job step; keywords after this line are ignored.
    script.push_str("# @ queue\n");

    Ok(script)
}

fn format_limit(wall_time: WallTime) -> SweepResult<String> {
    if wall_time.is_zero() {
        return Err(SweepError::render(VARIANT, "wall_clock_limit must be positive"));
    }
    if wall_time.as_secs() > MAX_WALL_CLOCK_SECS {
        return Err(SweepError::render(
            VARIANT,
            format!("wall_clock_limit {wall_time} is not representable"),
        ));
    }
    let (hours, minutes, seconds) = wall_time.hms();
    Ok(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

fn notification(events: EmailEvents) -> &'static str {
    match events {
        EmailEvents::All => "always",
        EmailEvents::Begin => "start",
        EmailEvents::End => "complete",
        EmailEvents::Fail => "error",
        EmailEvents::None => "never",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SubmissionOptions;
    use crate::render::tests::sample_job;
    use crate::render::{SchedulerVariant, render};

    #[test]
    fn test_loadleveler_script() {
        let job = sample_job().with_options(SubmissionOptions {
            email: Some("me@example.org".into()),
            email_events: EmailEvents::End,
            ..SubmissionOptions::default()
        });
        let script = render(&job, SchedulerVariant::LoadLeveler).unwrap();

        assert!(script.contains("# @ job_name = tscan_1\n"));
        assert!(script.contains("# @ job_type = parallel\n"));
        assert!(script.contains("# @ node = 2\n"));
        assert!(script.contains("# @ tasks_per_node = 48\n"));
        assert!(script.contains("# @ wall_clock_limit = 08:00:00\n"));
        assert!(script.contains("# @ class = skl_fua_prod\n"));
        assert!(script.contains("# @ requirements = (Memory >= 20480)\n"));
        assert!(script.contains("# @ notification = complete\n"));

        // Step terminator closes the header, before the shell body.
        let queue = script.find("# @ queue\n").unwrap();
        assert!(queue < script.find("set -e").unwrap());
    }

    #[test]
    fn test_format_limit() {
        assert_eq!(format_limit(WallTime::from_hours(30)).unwrap(), "30:00:00");
        assert!(format_limit(WallTime::from_secs(0)).is_err());
    }
}
