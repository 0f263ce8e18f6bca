//! Parameter sweeps for HPC batch schedulers
//!
//! This crate turns a declarative run configuration into one submission
//! script per point of a parameter scan, with resource requests computed
//! against the ceilings of the target cluster.
//!
//! # Overview
//!
//! 1. **Expansion**: a [`ScanSpecification`] becomes an [`Expansion`], the
//!    ordered cross-product (or lockstep zip) of its axes
//! 2. **Allocation**: [`allocate`] maps a [`WorkloadHint`] onto a
//!    [`ClusterProfile`], memory first, wall-time clamped to the ceiling
//! 3. **Definition**: [`JobDefinition::build`] names the job and fixes its
//!    working directory and arguments
//! 4. **Rendering**: [`render`] writes the scheduler-specific script
//! 5. **Submission**: the [`Orchestrator`] hands each script to a
//!    [`Submitter`] and collects one [`SubmissionOutcome`] per job
//!
//! # Supported Schedulers
//!
//! | Scheduler | Submit | Dependencies | Script |
//! |-----------|--------|--------------|--------|
//! | Slurm | sbatch | `--dependency=afterany` | `.slurm` |
//! | PBS/Torque | qsub | `-W depend=afterany` | `.pbs` |
//! | LoadLeveler | llsubmit | - | `.ll` |
//! | Local shell | bash | - | `.sh` |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use parasweep_sched::{CommandSubmitter, Orchestrator, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::load("temperature_scan.yaml")?;
//!     let orchestrator = Orchestrator::new(Arc::new(CommandSubmitter::default()))
//!         .with_telemetry(config.telemetry.build_or_noop());
//!
//!     let report = orchestrator.run(&config).await?;
//!     println!("{} submitted, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod render;
pub mod resources;
pub mod scan;
pub mod submit;
pub mod telemetry;
pub mod units;

pub use cluster::{ClusterProfile, ClusterQuirks};
pub use config::RunConfig;
pub use error::{SweepError, SweepResult};
pub use job::{BaseConfig, EmailEvents, JobDefinition, SubmissionOptions};
pub use orchestrator::{
    Orchestrator, PlannedJob, RenderedJob, SubmissionOutcome, SweepReport, plan,
};
pub use render::{SchedulerVariant, render, render_segment};
pub use resources::{ResourceRequest, WorkloadHint, allocate};
pub use scan::{
    Axis, Expansion, ParamValue, ParameterCombination, RangeExpr, ScanMode, ScanSpecification,
};
pub use submit::{
    CommandSubmitter, DryRunRecord, DryRunSubmitter, SubmissionRequest, SubmissionResponse,
    Submitter,
};
pub use telemetry::{
    FallbackSink, JsonLinesSink, MultiSink, NoopSink, TelemetryConfig, TelemetryRecord,
    TelemetrySink, WebhookSink,
};
pub use units::{Memory, WallTime};
