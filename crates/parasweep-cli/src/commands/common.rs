//! Shared helpers for CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use parasweep_sched::{ResourceRequest, RunConfig, ScanMode};

/// Load and validate a run configuration.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    RunConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Print the run header shared by `plan` and `submit`.
pub fn print_run_header(config: &RunConfig) {
    println!(
        "  Run:     {} ({} job(s))",
        style(&config.base.run_name).green(),
        config.job_count()
    );
    println!(
        "  Cluster: {} via {}",
        style(&config.cluster.name).yellow(),
        style(config.cluster.scheduler).magenta()
    );
    if !config.expansion.axes().is_empty() {
        let mode = match config.expansion.mode() {
            ScanMode::Product => "product",
            ScanMode::Zip => "zip",
        };
        let axes: Vec<String> = config
            .expansion
            .axes()
            .iter()
            .map(|a| format!("{} ({})", a.name, a.values.len()))
            .collect();
        println!("  Scan:    {} of {}", mode, axes.join(", "));
    }
    println!();
}

/// One-line description of an allocation.
pub fn describe_resources(resources: &ResourceRequest) -> String {
    let mut line = format!(
        "{} node(s) x {} cores, {} ({} safe)",
        resources.nodes, resources.cores_per_node, resources.wall_time, resources.safe_wall_time
    );
    if let Some(memory) = resources.memory_per_node {
        line.push_str(&format!(", {memory}/node"));
    }
    if let Some(queue) = &resources.queue {
        line.push_str(&format!(", queue {queue}"));
    }
    if resources.continuations > 0 {
        line.push_str(&format!(", +{} chained", resources.continuations));
    }
    line
}

/// Core-hours across all segments of the given allocations.
pub fn core_hours<'a>(resources: impl IntoIterator<Item = &'a ResourceRequest>) -> f64 {
    resources
        .into_iter()
        .map(|r| r.cpu_time().as_secs() as f64 / 3600.0)
        .sum()
}
