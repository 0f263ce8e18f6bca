//! Parsers for submission command output.

use crate::error::{SweepError, SweepResult};
use crate::render::SchedulerVariant;

/// Extract the scheduler job id from a successful submission.
///
/// The shell variant has no scheduler, so it never yields an id.
pub fn parse_job_id(variant: SchedulerVariant, stdout: &str) -> SweepResult<Option<String>> {
    match variant {
        SchedulerVariant::Slurm => parse_sbatch_output(stdout).map(Some),
        SchedulerVariant::Pbs => parse_qsub_output(stdout).map(Some),
        SchedulerVariant::LoadLeveler => parse_llsubmit_output(stdout).map(Some),
        SchedulerVariant::Shell => Ok(None),
    }
}

/// Parse sbatch output to extract job ID.
///
/// sbatch output format: "Submitted batch job 12345", optionally followed by
/// " on cluster <name>" on federated installations.
pub fn parse_sbatch_output(output: &str) -> SweepResult<String> {
    let trimmed = output.trim();

    for line in trimmed.lines() {
        if let Some(rest) = line.trim().strip_prefix("Submitted batch job ") {
            let job_id = rest.split_whitespace().next().unwrap_or_default();
            if !job_id.is_empty() && job_id.chars().all(|c| c.is_ascii_digit()) {
                return Ok(job_id.to_string());
            }
        }
    }

    Err(unexpected("sbatch", trimmed))
}

/// Parse qsub output to extract job ID.
///
/// qsub output format: "<number>.<server>", or a bare number on some systems.
pub fn parse_qsub_output(output: &str) -> SweepResult<String> {
    let trimmed = output.trim();
    let last = trimmed.lines().last().unwrap_or_default().trim();

    let numeric_head = last
        .split('.')
        .next()
        .is_some_and(|head| !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()));
    if numeric_head && !last.chars().any(char::is_whitespace) {
        return Ok(last.to_string());
    }

    Err(unexpected("qsub", trimmed))
}

/// Parse llsubmit output to extract the job ID.
///
/// llsubmit output format: `llsubmit: The job "host.domain.123" has been submitted.`
pub fn parse_llsubmit_output(output: &str) -> SweepResult<String> {
    let trimmed = output.trim();

    for line in trimmed.lines() {
        let Some(start) = line.find("The job \"") else {
            continue;
        };
        let rest = &line[start + "The job \"".len()..];
        if let Some(end) = rest.find('"') {
            let job_id = &rest[..end];
            if !job_id.is_empty() && line.contains("has been submitted") {
                return Ok(job_id.to_string());
            }
        }
    }

    Err(unexpected("llsubmit", trimmed))
}

fn unexpected(command: &str, output: &str) -> SweepError {
    SweepError::SubmissionFailure {
        command: command.to_string(),
        message: format!("Unexpected output format: {}", output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sbatch_output() {
        assert_eq!(
            parse_sbatch_output("Submitted batch job 12345\n").unwrap(),
            "12345"
        );
        assert_eq!(
            parse_sbatch_output("Submitted batch job 77 on cluster marconi").unwrap(),
            "77"
        );
        assert!(parse_sbatch_output("sbatch: error: invalid partition").is_err());
        assert!(parse_sbatch_output("").is_err());
    }

    #[test]
    fn test_parse_qsub_output() {
        assert_eq!(
            parse_qsub_output("12345.pbs-server\n").unwrap(),
            "12345.pbs-server"
        );
        assert_eq!(parse_qsub_output("9876").unwrap(), "9876");
        assert!(parse_qsub_output("qsub: Unknown queue").is_err());
        assert!(parse_qsub_output("").is_err());
    }

    #[test]
    fn test_parse_llsubmit_output() {
        let output = "llsubmit: Processed command file through Submit Filter.\n\
                      llsubmit: The job \"fen01.cineca.it.4521\" has been submitted.\n";
        assert_eq!(
            parse_llsubmit_output(output).unwrap(),
            "fen01.cineca.it.4521"
        );
        assert!(parse_llsubmit_output("llsubmit: 2512-051 class not defined").is_err());
    }

    #[test]
    fn test_parse_job_id_dispatch() {
        assert_eq!(
            parse_job_id(SchedulerVariant::Slurm, "Submitted batch job 5").unwrap(),
            Some("5".to_string())
        );
        assert_eq!(
            parse_job_id(SchedulerVariant::Shell, "anything").unwrap(),
            None
        );
    }
}
