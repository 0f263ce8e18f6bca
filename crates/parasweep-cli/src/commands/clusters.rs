//! Clusters command implementation.

use console::style;

use parasweep_sched::ClusterProfile;

/// Execute the clusters command.
pub fn execute() {
    println!("{} Built-in clusters:\n", style("parasweep").cyan().bold());

    for name in ClusterProfile::builtin_names() {
        let Some(profile) = ClusterProfile::builtin(name) else {
            continue;
        };
        println!(
            "  {} {} ({})",
            style("●").green(),
            style(&profile.name).bold(),
            profile.scheduler
        );
        println!(
            "    Nodes: up to {} x {} cores, {} each",
            profile.max_nodes, profile.cores_per_node, profile.memory_per_node
        );
        println!("    Wall-time: {}", profile.max_wall_time);

        let mut overrides: Vec<_> = profile.quirks.wall_time_overrides.iter().collect();
        overrides.sort();
        for (queue, limit) in overrides {
            println!("    Queue {}: {}", style(queue).dim(), limit);
        }
        println!();
    }

    println!(
        "  Use {} in the run configuration, or an inline profile table.",
        style("cluster: <name>").dim()
    );
}
