//! Submission orchestrator.
//!
//! Drives expand -> allocate -> build -> render -> submit for every scan
//! point, one job at a time. A job that fails anywhere on that path is
//! recorded as a failed [`SubmissionOutcome`] and the sweep moves on;
//! only configuration errors abort the run. Telemetry is best-effort.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::SweepResult;
use crate::job::{JobDefinition, job_name};
use crate::render::{SchedulerVariant, render_segment};
use crate::resources::{ResourceRequest, allocate};
use crate::scan::ParameterCombination;
use crate::submit::{SubmissionRequest, Submitter};
use crate::telemetry::{NoopSink, TelemetryRecord, TelemetrySink};

/// Result of taking one scan point to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub index: usize,
    pub job_name: String,
    pub parameters: ParameterCombination,
    /// `None` when allocation failed.
    pub resources: Option<ResourceRequest>,
    pub success: bool,
    /// Scheduler id of the first segment.
    pub job_id: Option<String>,
    /// Scheduler ids of the chained continuation segments.
    pub continuation_ids: Vec<String>,
    /// Raw output of the submission command(s).
    pub response: String,
    pub error: Option<String>,
}

impl SubmissionOutcome {
    pub fn failed(
        parameters: ParameterCombination,
        job_name: String,
        resources: Option<ResourceRequest>,
        error: String,
    ) -> Self {
        Self {
            index: parameters.index(),
            job_name,
            parameters,
            resources,
            success: false,
            job_id: None,
            continuation_ids: Vec::new(),
            response: String::new(),
            error: Some(error),
        }
    }
}

/// Aggregate result of a sweep, outcomes in combination order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    /// Jobs in the expansion, submitted or not.
    pub planned: usize,
    pub outcomes: Vec<SubmissionOutcome>,
    /// Stopped early on an interrupt.
    pub interrupted: bool,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Jobs never attempted because of an interrupt.
    pub fn skipped(&self) -> usize {
        self.planned.saturating_sub(self.outcomes.len())
    }

    pub fn all_succeeded(&self) -> bool {
        !self.interrupted && self.failed() == 0
    }
}

/// A job taken as far as rendered scripts.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedJob {
    pub job: JobDefinition,
    pub variant: SchedulerVariant,
    /// One script per segment, initial submission first.
    pub scripts: Vec<String>,
}

/// Planning result for one scan point.
#[derive(Debug)]
pub struct PlannedJob {
    pub index: usize,
    pub job_name: String,
    pub parameters: ParameterCombination,
    pub resources: Option<ResourceRequest>,
    pub rendered: SweepResult<RenderedJob>,
}

/// Allocate, build and render every job without submitting anything.
///
/// Configuration errors abort; per-job errors are kept in
/// [`PlannedJob::rendered`].
pub fn plan(config: &RunConfig) -> SweepResult<Vec<PlannedJob>> {
    config
        .expansion
        .iter()
        .map(|combo| {
            let name = job_name(&config.base.run_name, combo.index(), combo.total());
            let (resources, rendered) = prepare(combo.clone(), config);
            let rendered = match rendered {
                Err(e) if !e.is_per_job() => return Err(e),
                other => other,
            };
            Ok(PlannedJob {
                index: combo.index(),
                job_name: name,
                parameters: combo,
                resources,
                rendered,
            })
        })
        .collect()
}

fn prepare(
    combo: ParameterCombination,
    config: &RunConfig,
) -> (Option<ResourceRequest>, SweepResult<RenderedJob>) {
    let resources = match allocate(&config.workload, &config.cluster) {
        Ok(resources) => resources,
        Err(e) => return (None, Err(e)),
    };
    let variant = config.cluster.scheduler;
    let rendered = JobDefinition::build(combo, &config.base, resources.clone()).and_then(|job| {
        let job = job.with_options(config.submission.clone());
        let scripts = (0..job.segments())
            .map(|segment| render_segment(&job, variant, segment))
            .collect::<SweepResult<Vec<_>>>()?;
        debug!(
            "Rendered {} ({} segment(s), {} bytes)",
            job.name,
            scripts.len(),
            scripts.iter().map(String::len).sum::<usize>()
        );
        Ok(RenderedJob {
            job,
            variant,
            scripts,
        })
    });
    (Some(resources), rendered)
}

/// Sequential sweep driver.
pub struct Orchestrator {
    submitter: Arc<dyn Submitter>,
    telemetry: Box<dyn TelemetrySink>,
    interrupt: Arc<AtomicBool>,
    run_id: Uuid,
}

impl Orchestrator {
    pub fn new(submitter: Arc<dyn Submitter>) -> Self {
        Self {
            submitter,
            telemetry: Box::new(NoopSink),
            interrupt: Arc::new(AtomicBool::new(false)),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Share an interrupt flag; once set, no further job is submitted.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run the whole sweep.
    pub async fn run(&self, config: &RunConfig) -> SweepResult<SweepReport> {
        let planned = config.job_count();
        info!(
            "Sweep {}: {} job(s) on {} via {}",
            self.run_id,
            planned,
            config.cluster.name,
            self.submitter.name()
        );

        let mut outcomes = Vec::with_capacity(planned);
        let mut interrupted = false;

        for combo in &config.expansion {
            if self.interrupt.load(Ordering::SeqCst) {
                warn!(
                    "Interrupted: stopping after {} of {} job(s)",
                    outcomes.len(),
                    planned
                );
                interrupted = true;
                break;
            }

            let outcome = self.process(combo, config).await?;
            self.record(&outcome).await;
            outcomes.push(outcome);
        }

        let report = SweepReport {
            run_id: self.run_id,
            planned,
            outcomes,
            interrupted,
        };
        info!(
            "Sweep {} finished: {} submitted, {} failed",
            self.run_id,
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    async fn process(
        &self,
        combo: ParameterCombination,
        config: &RunConfig,
    ) -> SweepResult<SubmissionOutcome> {
        let name = job_name(&config.base.run_name, combo.index(), combo.total());
        let (resources, rendered) = prepare(combo.clone(), config);

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) if e.is_per_job() => {
                warn!("Job {} ({}) not submitted: {}", name, combo.label(), e);
                return Ok(SubmissionOutcome::failed(
                    combo,
                    name,
                    resources,
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let RenderedJob {
            job,
            variant,
            scripts,
        } = rendered;
        let segments = scripts.len();
        let mut outcome = SubmissionOutcome {
            index: job.index,
            job_name: job.name.clone(),
            parameters: job.parameters.clone(),
            resources: Some(job.resources.clone()),
            success: false,
            job_id: None,
            continuation_ids: Vec::new(),
            response: String::new(),
            error: None,
        };

        let mut previous: Option<String> = None;
        for (segment, script) in scripts.into_iter().enumerate() {
            if segment > 0 && previous.is_none() {
                outcome.error = Some(format!(
                    "segment {segment} cannot be chained: the previous submission returned no job id"
                ));
                return Ok(outcome);
            }

            let request =
                SubmissionRequest::for_job(&job, variant, script, segment as u32, previous.take());
            match self.submitter.submit(&request).await {
                Ok(response) => {
                    if segment == 0 {
                        outcome.job_id = response.job_id.clone();
                    } else if let Some(ref id) = response.job_id {
                        outcome.continuation_ids.push(id.clone());
                    }
                    outcome.response.push_str(&response.output);
                    previous = response.job_id;
                }
                Err(e) => {
                    warn!(
                        "Submission of {} segment {}/{} failed: {}",
                        job.name,
                        segment + 1,
                        segments,
                        e
                    );
                    outcome.error = Some(e.to_string());
                    return Ok(outcome);
                }
            }
        }

        info!(
            "Submitted {} ({}) as {}",
            job.name,
            job.parameters.label(),
            outcome.job_id.as_deref().unwrap_or("local run")
        );
        outcome.success = true;
        Ok(outcome)
    }

    async fn record(&self, outcome: &SubmissionOutcome) {
        let result = match TelemetryRecord::from_outcome(self.run_id, outcome) {
            Ok(record) => self.telemetry.record(&record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                "Telemetry sink '{}' failed for {}: {}",
                self.telemetry.name(),
                outcome.job_name,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::DryRunSubmitter;

    const CONFIG: &str = r#"
base:
  run_name: tscan
  executable: /opt/spice/bin/spice
  output_dir: /scratch/runs
  arguments: ["-t", "{temperature}"]
scan:
  parameters:
    temperature: [100, 200, 300]
cluster:
  name: small
  scheduler: slurm
  max_nodes: 1
  cores_per_node: 8
  memory_per_node: 32G
  max_wall_time: "24:00:00"
workload:
  memory: 4G
  wall_time: "60:00:00"
"#;

    #[tokio::test]
    async fn test_chained_segments_are_submitted_in_order() {
        let config = RunConfig::from_yaml_str(CONFIG).unwrap();
        let submitter = Arc::new(DryRunSubmitter::new());
        let orchestrator = Orchestrator::new(submitter.clone());

        let report = orchestrator.run(&config).await.unwrap();
        assert_eq!(report.succeeded(), 3);
        assert!(report.all_succeeded());

        let first = &report.outcomes[0];
        assert_eq!(first.job_id.as_deref(), Some("1000"));
        assert_eq!(first.continuation_ids, vec!["1001", "1002"]);

        let requests = submitter.submitted().await;
        assert_eq!(requests.len(), 9);
        assert_eq!(requests[0].depends_on, None);
        assert_eq!(requests[1].depends_on.as_deref(), Some("1000"));
        assert_eq!(requests[2].depends_on.as_deref(), Some("1001"));
        assert_eq!(requests[2].segment, 2);
        assert_eq!(requests[2].job_name, "tscan_0");
        assert!(
            requests[2]
                .script_path
                .ends_with("tscan_0/tscan_0.seg2.slurm")
        );
    }

    #[tokio::test]
    async fn test_interrupt_stops_submission() {
        let config = RunConfig::from_yaml_str(CONFIG).unwrap();
        let orchestrator = Orchestrator::new(Arc::new(DryRunSubmitter::new()));
        orchestrator.interrupt_handle().store(true, Ordering::SeqCst);

        let report = orchestrator.run(&config).await.unwrap();
        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.skipped(), 3);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_plan_renders_without_submitting() {
        let config = RunConfig::from_yaml_str(CONFIG).unwrap();
        let planned = plan(&config).unwrap();
        assert_eq!(planned.len(), 3);
        assert_eq!(planned[2].job_name, "tscan_2");

        let rendered = planned[0].rendered.as_ref().unwrap();
        assert_eq!(rendered.scripts.len(), 3);
        assert!(rendered.scripts[0].contains("#SBATCH --time=1-00:00:00"));
        assert!(rendered.scripts[0].contains("'-t' '100'"));
    }

    #[test]
    fn test_report_counts() {
        let combo = crate::scan::Expansion::single().get(0).unwrap();
        let mut ok = SubmissionOutcome::failed(combo.clone(), "a_0".into(), None, String::new());
        ok.success = true;
        ok.error = None;
        let report = SweepReport {
            run_id: Uuid::new_v4(),
            planned: 3,
            outcomes: vec![
                ok,
                SubmissionOutcome::failed(combo, "a_1".into(), None, "x".into()),
            ],
            interrupted: false,
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
    }
}
