//! Resource policy: workload hint + cluster profile -> concrete request.
//!
//! Order of decisions:
//! 1. Wall-time is clamped to the effective ceiling (generic limit narrowed
//!    by the queue's quirk). A `safe_fraction` of every segment is kept for
//!    the job's own I/O, so segments are counted against the safe part of
//!    the ceiling. Whatever does not fit becomes continuation segments; a
//!    single segment never exceeds the ceiling.
//! 2. The node count is the smallest that satisfies the memory requirement.
//!    Memory wins over packing density: per-node memory never drops below the
//!    workload's share.
//! 3. Cores are packed onto those nodes up to `cores_per_node`; a larger
//!    core request adds nodes, spare cores on a node are left idle.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cluster::ClusterProfile;
use crate::error::{SweepError, SweepResult};
use crate::units::{Memory, WallTime};

/// Advisory description of what one job wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadHint {
    /// Total cores for the job. Defaults to filling every allocated node.
    #[serde(default)]
    pub cores: Option<u32>,

    /// Total memory for the job.
    #[serde(default)]
    pub memory: Option<Memory>,

    /// Requested wall-time. Defaults to the effective ceiling.
    #[serde(default)]
    pub wall_time: Option<WallTime>,

    /// Queue/partition to submit to.
    #[serde(default)]
    pub queue: Option<String>,

    /// Whether the memory requirement may be spread over several nodes.
    /// A non-splittable workload must fit into one node's memory.
    #[serde(default = "default_splittable")]
    pub splittable: bool,

    /// Share of each segment's wall-time reserved for writing output and
    /// restart files. `0.0` lets the executable use the full segment.
    #[serde(default = "default_safe_fraction")]
    pub safe_fraction: f64,
}

/// Reserve 10% of a segment by default.
pub const DEFAULT_SAFE_FRACTION: f64 = 0.1;

fn default_splittable() -> bool {
    true
}

fn default_safe_fraction() -> f64 {
    DEFAULT_SAFE_FRACTION
}

impl Default for WorkloadHint {
    fn default() -> Self {
        Self {
            cores: None,
            memory: None,
            wall_time: None,
            queue: None,
            splittable: true,
            safe_fraction: DEFAULT_SAFE_FRACTION,
        }
    }
}

impl WorkloadHint {
    pub fn with_cores(mut self, cores: u32) -> Self {
        self.cores = Some(cores);
        self
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_wall_time(mut self, wall_time: WallTime) -> Self {
        self.wall_time = Some(wall_time);
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_safe_fraction(mut self, fraction: f64) -> Self {
        self.safe_fraction = fraction;
        self
    }

    /// Require the whole memory requirement on a single node.
    pub fn indivisible(mut self) -> Self {
        self.splittable = false;
        self
    }

    pub fn validate(&self) -> SweepResult<()> {
        if self.cores == Some(0) {
            return Err(SweepError::config("workload.cores must be at least 1"));
        }
        if self.wall_time.is_some_and(|w| w.is_zero()) {
            return Err(SweepError::config("workload.wall_time must be positive"));
        }
        if self.queue.as_deref().is_some_and(|q| q.trim().is_empty()) {
            return Err(SweepError::config("workload.queue must not be empty"));
        }
        if !(0.0..1.0).contains(&self.safe_fraction) {
            return Err(SweepError::config(format!(
                "workload.safe_fraction must be at least 0 and below 1, got {}",
                self.safe_fraction
            )));
        }
        Ok(())
    }
}

/// Concrete allocation for one job.
///
/// Satisfies `0 < nodes <= max_nodes`, `cores_per_node <= cluster cores`,
/// `memory_per_node <= cluster memory` and `wall_time <= effective ceiling`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub nodes: u32,
    pub cores_per_node: u32,
    /// `None` when the workload stated no memory requirement.
    pub memory_per_node: Option<Memory>,
    pub wall_time: WallTime,
    /// Time the executable may use in each segment before the I/O reserve.
    pub safe_wall_time: WallTime,
    pub queue: Option<String>,
    /// Extra chained submissions needed to cover the requested wall-time.
    pub continuations: u32,
}

impl ResourceRequest {
    pub fn total_cores(&self) -> u64 {
        u64::from(self.nodes) * u64::from(self.cores_per_node)
    }

    /// Core-time across all segments.
    pub fn cpu_time(&self) -> WallTime {
        self.wall_time
            .saturating_mul(self.total_cores())
            .saturating_mul(u64::from(self.continuations) + 1)
    }
}

/// Compute the allocation for `workload` on `cluster`.
pub fn allocate(workload: &WorkloadHint, cluster: &ClusterProfile) -> SweepResult<ResourceRequest> {
    let unsatisfiable = |reason: String| SweepError::ResourceUnsatisfiable {
        cluster: cluster.name.clone(),
        reason,
    };

    // Wall-time: hard ceiling, never raised.
    let keep = 1.0 - workload.safe_fraction;
    let ceiling = cluster.wall_time_ceiling(workload.queue.as_deref());
    let safe_ceiling = ceiling.scaled_down(keep).max(WallTime::from_secs(1));
    let requested = workload.wall_time.unwrap_or(ceiling);
    let wall_time = requested.min(ceiling);
    let segments = match workload.wall_time {
        Some(requested) => safe_ceiling.segments_to_cover(requested).max(1),
        None => 1,
    };
    let continuations = u32::try_from(segments - 1)
        .map_err(|_| unsatisfiable(format!("wall-time {requested} needs too many segments")))?;
    if continuations > 0 {
        warn!(
            "Requested wall-time {} exceeds the safe {} of the {} ceiling on {}; \
             splitting into {} chained jobs",
            requested, safe_ceiling, ceiling, cluster.name, segments
        );
    }
    let safe_wall_time = if continuations > 0 {
        safe_ceiling
    } else {
        wall_time.scaled_down(keep)
    };

    // Memory decides the minimum node count.
    let memory = workload.memory.unwrap_or(Memory::ZERO);
    let node_memory = cluster.memory_per_node;
    let memory_nodes = if memory <= node_memory {
        1
    } else if !workload.splittable {
        return Err(unsatisfiable(format!(
            "{memory} cannot be split across nodes and exceeds the {node_memory} of a single node"
        )));
    } else {
        let needed = memory.as_mb().div_ceil(node_memory.as_mb());
        if needed > u64::from(cluster.max_nodes) {
            return Err(unsatisfiable(format!(
                "{memory} needs {needed} nodes of {node_memory}, only {} available ({} in total)",
                cluster.max_nodes,
                cluster.total_memory()
            )));
        }
        needed as u32
    };

    // Cores only ever add nodes on top of the memory-driven count.
    let core_nodes = match workload.cores {
        Some(cores) => {
            let needed = cores.div_ceil(cluster.cores_per_node);
            if needed > cluster.max_nodes {
                return Err(unsatisfiable(format!(
                    "{cores} cores need {needed} nodes of {} cores, only {} available",
                    cluster.cores_per_node, cluster.max_nodes
                )));
            }
            needed
        }
        None => 1,
    };
    let nodes = memory_nodes.max(core_nodes);

    let cores_per_node = match workload.cores {
        Some(cores) => {
            let per_node = cores.div_ceil(nodes).min(cluster.cores_per_node);
            if per_node * nodes != cores || per_node < cluster.cores_per_node {
                warn!(
                    "Inefficient number of cores ({}) for {} node(s) of {} cores on {}: \
                     the account is charged for every core of an occupied node",
                    cores, nodes, cluster.cores_per_node, cluster.name
                );
            }
            per_node
        }
        None => cluster.cores_per_node,
    };

    if nodes == cluster.max_nodes && nodes > 1 {
        warn!(
            "Using the maximum of {} nodes on {}; the job will queue behind any running jobs",
            nodes, cluster.name
        );
    }

    let memory_per_node = if memory.is_zero() {
        None
    } else if workload.splittable {
        Some(memory.div_ceil(nodes))
    } else {
        Some(memory)
    };

    Ok(ResourceRequest {
        nodes,
        cores_per_node,
        memory_per_node,
        wall_time,
        safe_wall_time,
        queue: workload.queue.clone(),
        continuations,
    })
}
