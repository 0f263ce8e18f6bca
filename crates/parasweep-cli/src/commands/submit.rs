//! Submit command implementation.
//!
//! Submits every job of a sweep through `sbatch`, `qsub`, `llsubmit` or a
//! local shell, writing each script into the job's working directory first.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use parasweep_sched::{
    CommandSubmitter, DryRunSubmitter, NoopSink, Orchestrator, Submitter, SweepReport,
    TelemetrySink,
};

use super::common::{core_hours, load_config, print_run_header};

/// Execute the submit command.
pub async fn execute(
    config_path: &Path,
    dry_run: bool,
    timeout: u64,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;

    println!(
        "{} Submitting {} to {}{}",
        style("→").cyan().bold(),
        style(config_path.display()).green(),
        style(&config.cluster.name).yellow(),
        if dry_run { " (dry run)" } else { "" }
    );
    print_run_header(&config);

    let dry = Arc::new(DryRunSubmitter::new());
    let submitter: Arc<dyn Submitter> = if dry_run {
        dry.clone()
    } else {
        Arc::new(CommandSubmitter::new(Duration::from_secs(timeout)))
    };

    let telemetry: Box<dyn TelemetrySink> = if dry_run {
        Box::new(NoopSink)
    } else {
        config.telemetry.build_or_noop()
    };
    let orchestrator = Orchestrator::new(submitter).with_telemetry(telemetry);

    // Ctrl-C stops issuing new submissions; jobs already queued stay queued.
    let interrupt = orchestrator.interrupt_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupt received, finishing the current job",
                style("!").yellow().bold()
            );
            interrupt.store(true, Ordering::SeqCst);
        }
    });

    let report = orchestrator.run(&config).await;
    watcher.abort();
    let report = report?;

    print_report(&report);

    if dry_run {
        let requests = dry.submitted().await;
        println!(
            "\n  {} script(s) would be submitted; nothing was written.",
            requests.len()
        );
        for request in &requests {
            println!(
                "    {} {}{}",
                style(request.variant.submit_command()).dim(),
                request.script_path.display(),
                request
                    .depends_on
                    .as_deref()
                    .map(|id| format!(" (after {id})"))
                    .unwrap_or_default()
            );
        }
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        println!("  Report written to {}", style(path.display()).cyan());
    }

    if report.interrupted {
        anyhow::bail!("interrupted: {} job(s) not submitted", report.skipped());
    }
    if report.failed() > 0 {
        anyhow::bail!("{} of {} job(s) failed", report.failed(), report.planned);
    }

    Ok(())
}

/// Print one row per outcome and a summary line.
fn print_report(report: &SweepReport) {
    println!("  {:<24} {:<14} {}", "JOB", "ID", "STATUS");
    for outcome in &report.outcomes {
        let id = match (&outcome.job_id, outcome.continuation_ids.is_empty()) {
            (Some(id), true) => id.clone(),
            (Some(id), false) => format!("{id} +{}", outcome.continuation_ids.len()),
            (None, _) => "-".to_string(),
        };
        let status = match &outcome.error {
            None => style("submitted".to_string()).green(),
            Some(e) => style(e.clone()).red(),
        };
        println!("  {:<24} {:<14} {}", outcome.job_name, id, status);
    }

    let hours = core_hours(
        report
            .outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.resources.as_ref()),
    );
    println!();
    println!(
        "  {} submitted, {} failed, {} skipped ({:.1} core-hours)",
        style(report.succeeded()).green().bold(),
        style(report.failed()).red().bold(),
        report.skipped(),
        hours
    );
    println!("  Run id: {}", style(report.run_id).dim());
}
