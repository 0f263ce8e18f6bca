//! Cluster profiles: resource ceilings and per-queue quirks.
//!
//! A profile is loaded once per run and only ever read afterwards. Quirks are
//! data, not code: a queue with a tighter wall-time limit is one more entry in
//! [`ClusterQuirks::wall_time_overrides`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};
use crate::render::SchedulerVariant;
use crate::units::{Memory, WallTime};

/// Static description of a cluster and the scheduler in front of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterProfile {
    /// Name of the cluster.
    pub name: String,
    /// Scheduler dialect accepted by this cluster.
    pub scheduler: SchedulerVariant,
    /// Maximum nodes a single job may request.
    pub max_nodes: u32,
    /// Cores available on each node.
    pub cores_per_node: u32,
    /// Memory available on each node.
    pub memory_per_node: Memory,
    /// Generic wall-time ceiling for a single job.
    pub max_wall_time: WallTime,
    /// Named deviations from the generic limits.
    #[serde(default)]
    pub quirks: ClusterQuirks,
}

/// Per-queue overrides of the generic cluster limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterQuirks {
    /// Queue/partition name to wall-time ceiling.
    #[serde(default)]
    pub wall_time_overrides: FxHashMap<String, WallTime>,
}

impl ClusterProfile {
    /// Marconi SKL partition (CINECA): Slurm, 48 cores / 182 GB per node.
    pub fn marconi() -> Self {
        Self {
            name: "marconi".into(),
            scheduler: SchedulerVariant::Slurm,
            max_nodes: 64,
            cores_per_node: 48,
            memory_per_node: Memory::from_gb(182),
            max_wall_time: WallTime::from_hours(24),
            quirks: ClusterQuirks::default(),
        }
        .with_wall_time_override("skl_fua_dbg", WallTime::from_hours(2))
    }

    /// Marconi under the long-run allocation: 48 h generic ceiling, but the
    /// production and debug queues keep their own limits.
    pub fn marconi_long() -> Self {
        Self {
            name: "marconi_long".into(),
            max_wall_time: WallTime::from_hours(48),
            ..Self::marconi()
        }
        .with_wall_time_override("skl_fua_prod", WallTime::from_hours(24))
    }

    /// Cumulus: PBS/Torque, 32 cores / 512 GB per node.
    ///
    /// The site enforces no wall-time limit; the profile uses one week.
    pub fn cumulus() -> Self {
        Self {
            name: "cumulus".into(),
            scheduler: SchedulerVariant::Pbs,
            max_nodes: 16,
            cores_per_node: 32,
            memory_per_node: Memory::from_gb(512),
            max_wall_time: WallTime::from_days(7),
            quirks: ClusterQuirks::default(),
        }
    }

    /// Names accepted by [`ClusterProfile::builtin`].
    pub fn builtin_names() -> &'static [&'static str] {
        &["marconi", "marconi_long", "cumulus"]
    }

    /// Look up a built-in profile by (case-insensitive) name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "marconi" | "marconi_skl" => Some(Self::marconi()),
            "marconi_long" => Some(Self::marconi_long()),
            "cumulus" => Some(Self::cumulus()),
            _ => None,
        }
    }

    /// Add or replace a per-queue wall-time ceiling.
    pub fn with_wall_time_override(mut self, queue: impl Into<String>, limit: WallTime) -> Self {
        self.quirks.wall_time_overrides.insert(queue.into(), limit);
        self
    }

    /// Effective wall-time ceiling for a queue: the narrower of the generic
    /// limit and the queue's override.
    pub fn wall_time_ceiling(&self, queue: Option<&str>) -> WallTime {
        queue
            .and_then(|q| self.quirks.wall_time_overrides.get(q))
            .map_or(self.max_wall_time, |limit| (*limit).min(self.max_wall_time))
    }

    /// Total memory across every node a job could request.
    pub fn total_memory(&self) -> Memory {
        self.memory_per_node.saturating_mul(self.max_nodes)
    }

    /// Reject profiles that cannot host any job.
    pub fn validate(&self) -> SweepResult<()> {
        let name = &self.name;
        if name.trim().is_empty() {
            return Err(SweepError::config("cluster.name must not be empty"));
        }
        if self.max_nodes == 0 {
            return Err(SweepError::config(format!(
                "cluster '{name}': max_nodes must be at least 1"
            )));
        }
        if self.cores_per_node == 0 {
            return Err(SweepError::config(format!(
                "cluster '{name}': cores_per_node must be at least 1"
            )));
        }
        if self.memory_per_node.is_zero() {
            return Err(SweepError::config(format!(
                "cluster '{name}': memory_per_node must be positive"
            )));
        }
        if self.max_wall_time.is_zero() {
            return Err(SweepError::config(format!(
                "cluster '{name}': max_wall_time must be positive"
            )));
        }
        if let Some((queue, _)) = self
            .quirks
            .wall_time_overrides
            .iter()
            .find(|(_, limit)| limit.is_zero())
        {
            return Err(SweepError::config(format!(
                "cluster '{name}': wall-time override for queue '{queue}' must be positive"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        for name in ClusterProfile::builtin_names() {
            let profile = ClusterProfile::builtin(name).unwrap();
            profile.validate().unwrap();
        }
        assert!(ClusterProfile::builtin("MARCONI").is_some());
        assert!(ClusterProfile::builtin("summit").is_none());
        assert_eq!(ClusterProfile::cumulus().scheduler, SchedulerVariant::Pbs);
    }

    #[test]
    fn test_quirk_narrows_ceiling() {
        let marconi = ClusterProfile::marconi();
        assert_eq!(marconi.wall_time_ceiling(None), WallTime::from_hours(24));
        assert_eq!(
            marconi.wall_time_ceiling(Some("skl_fua_prod")),
            WallTime::from_hours(24)
        );
        assert_eq!(
            marconi.wall_time_ceiling(Some("skl_fua_dbg")),
            WallTime::from_hours(2)
        );
    }

    #[test]
    fn test_override_never_raises_ceiling() {
        let profile =
            ClusterProfile::marconi().with_wall_time_override("lenient", WallTime::from_hours(96));
        assert_eq!(
            profile.wall_time_ceiling(Some("lenient")),
            WallTime::from_hours(24)
        );

        let long = ClusterProfile::marconi_long();
        assert_eq!(long.wall_time_ceiling(None), WallTime::from_hours(48));
        assert_eq!(
            long.wall_time_ceiling(Some("skl_fua_prod")),
            WallTime::from_hours(24)
        );
    }

    #[test]
    fn test_validate_rejects_degenerate_profile() {
        let mut profile = ClusterProfile::cumulus();
        profile.max_nodes = 0;
        assert!(profile.validate().is_err());

        let profile =
            ClusterProfile::cumulus().with_wall_time_override("q", WallTime::from_secs(0));
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_inline_yaml_profile() {
        let yaml = r#"
name: local
scheduler: slurm
max_nodes: 4
cores_per_node: 8
memory_per_node: 32G
max_wall_time: "1-00:00:00"
quirks:
  wall_time_overrides:
    debug: "00:30:00"
"#;
        let profile: ClusterProfile = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(profile.memory_per_node, Memory::from_gb(32));
        assert_eq!(profile.max_wall_time, WallTime::from_days(1));
        assert_eq!(
            profile.wall_time_ceiling(Some("debug")),
            WallTime::from_minutes(30)
        );
    }
}
