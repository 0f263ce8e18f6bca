//! Plain shell fallback for running a job on the local machine.
//!
//! There is no scheduler to read directives, so the resource request is
//! recorded as comments and the wall-time is enforced with `timeout`.
//! Anything that only a scheduler could honor is rejected.

use crate::error::{SweepError, SweepResult};
use crate::job::JobDefinition;

const VARIANT: &str = "shell";

pub(super) fn header(job: &JobDefinition) -> SweepResult<String> {
    let resources = &job.resources;

    if resources.nodes > 1 {
        return Err(SweepError::render(
            VARIANT,
            format!(
                "job {} needs {} nodes; a local run has one",
                job.name, resources.nodes
            ),
        ));
    }
    if resources.wall_time.is_zero() {
        return Err(SweepError::render(VARIANT, "wall-time must be positive"));
    }
    let unsupported = [
        ("queue", resources.queue.is_some()),
        ("account", job.options.account.is_some()),
        ("email", job.options.email.is_some()),
    ];
    if let Some((field, _)) = unsupported.iter().find(|(_, set)| *set) {
        return Err(SweepError::render(
            VARIANT,
            format!("{field} has no meaning for a local run"),
        ));
    }

    let mut script = String::new();
    script.push_str("#!/bin/bash\n");
    script.push_str(&format!("# Job: {}\n", job.name));
    script.push_str(&format!(
        "# Resources: {} core(s), wall-time {}\n",
        resources.cores_per_node, resources.wall_time
    ));
    if let Some(memory) = resources.memory_per_node {
        script.push_str(&format!("# Memory: {}\n", memory));
    }
    Ok(script)
}
