//! Plan command implementation.
//!
//! Renders every job of the sweep and prints the allocation each one would
//! get, without touching the scheduler.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use parasweep_sched::{SubmissionRequest, plan};

use super::common::{core_hours, describe_resources, load_config, print_run_header};

/// Execute the plan command.
pub fn execute(config_path: &Path, out: Option<&Path>) -> Result<()> {
    println!(
        "{} Planning {}",
        style("→").cyan().bold(),
        style(config_path.display()).green()
    );

    let config = load_config(config_path)?;
    print_run_header(&config);

    let planned = plan(&config)?;

    if let Some(dir) = out {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let mut written = 0usize;
    for job in &planned {
        match &job.rendered {
            Ok(rendered) => {
                println!(
                    "  {} {:<24} {}",
                    style("✓").green(),
                    job.job_name,
                    describe_resources(&rendered.job.resources)
                );
                println!("      {}", style(job.parameters.label()).dim());

                if let Some(dir) = out {
                    for (segment, script) in rendered.scripts.iter().enumerate() {
                        let request = SubmissionRequest::for_job(
                            &rendered.job,
                            rendered.variant,
                            script.clone(),
                            segment as u32,
                            None,
                        );
                        let Some(file_name) = request.script_path.file_name() else {
                            continue;
                        };
                        let path = dir.join(file_name);
                        fs::write(&path, script)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        written += 1;
                    }
                }
            }
            Err(e) => {
                println!(
                    "  {} {:<24} {}",
                    style("✗").red(),
                    job.job_name,
                    style(e).red()
                );
            }
        }
    }

    let ok = planned.iter().filter(|j| j.rendered.is_ok()).count();
    let hours = core_hours(
        planned
            .iter()
            .filter(|j| j.rendered.is_ok())
            .filter_map(|j| j.resources.as_ref()),
    );

    println!();
    println!(
        "  {} of {} job(s) ready, {:.1} core-hours requested",
        style(ok).bold(),
        planned.len(),
        hours
    );
    if let Some(dir) = out {
        println!(
            "  Wrote {} script(s) to {}",
            written,
            style(dir.display()).cyan()
        );
    }

    if ok < planned.len() {
        anyhow::bail!("{} job(s) cannot be rendered", planned.len() - ok);
    }

    Ok(())
}
