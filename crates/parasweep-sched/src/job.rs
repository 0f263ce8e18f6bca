//! Job definitions: one fully resolved unit of work per scan point.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};
use crate::render::escape::is_job_name_char;
use crate::resources::ResourceRequest;
use crate::scan::ParameterCombination;

/// Longest job name every supported scheduler keeps intact.
pub const MAX_JOB_NAME_LEN: usize = 64;

/// Settings shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Prefix of every job name.
    pub run_name: String,

    /// Program each job executes.
    pub executable: PathBuf,

    /// Input files staged into each working directory before the run.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// Parent directory of the per-job working directories.
    pub output_dir: PathBuf,

    /// Arguments passed to the executable; `{name}` expands to the value of
    /// scan parameter `name`.
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Environment modules loaded before the run.
    #[serde(default)]
    pub modules: Vec<String>,
}

impl BaseConfig {
    pub fn new(
        run_name: impl Into<String>,
        executable: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            executable: executable.into(),
            template_dir: None,
            output_dir: output_dir.into(),
            arguments: Vec::new(),
            modules: Vec::new(),
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }

    /// Check every required field is present and usable.
    pub fn validate(&self) -> SweepResult<()> {
        let run_name = self.run_name.trim();
        if run_name.is_empty() {
            return Err(SweepError::config("base.run_name is required"));
        }
        if !run_name.chars().all(is_job_name_char) {
            return Err(SweepError::config(format!(
                "base.run_name '{run_name}' may only contain ASCII letters, digits, '_' and '-'"
            )));
        }
        if run_name.len() + 2 > MAX_JOB_NAME_LEN {
            return Err(SweepError::config(format!(
                "base.run_name '{run_name}' leaves no room for a job index within {MAX_JOB_NAME_LEN} characters"
            )));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(SweepError::config("base.executable is required"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(SweepError::config("base.output_dir is required"));
        }
        if self.modules.iter().any(|m| m.trim().is_empty()) {
            return Err(SweepError::config("base.modules must not contain empty names"));
        }
        Ok(())
    }
}

/// Mail notification triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmailEvents {
    #[default]
    All,
    Begin,
    End,
    Fail,
    None,
}

/// Optional scheduler directives shared by every job of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionOptions {
    /// Account charged for the allocation.
    #[serde(default)]
    pub account: Option<String>,

    /// Quality of service (Slurm only).
    #[serde(default)]
    pub qos: Option<String>,

    /// Address notified about job state changes.
    #[serde(default)]
    pub email: Option<String>,

    /// Which state changes trigger a mail. Ignored without `email`.
    #[serde(default)]
    pub email_events: EmailEvents,
}

/// One concrete job, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDefinition {
    /// `{run_name}_{index}` with the index zero-padded across the expansion.
    pub name: String,
    pub index: usize,
    pub work_dir: PathBuf,
    pub parameters: ParameterCombination,
    pub resources: ResourceRequest,
    pub executable: PathBuf,
    pub template_dir: Option<PathBuf>,
    /// Arguments with placeholders already substituted.
    pub arguments: Vec<String>,
    pub modules: Vec<String>,
    pub options: SubmissionOptions,
}

impl JobDefinition {
    /// Combine one scan point with the shared configuration.
    pub fn build(
        combo: ParameterCombination,
        base: &BaseConfig,
        resources: ResourceRequest,
    ) -> SweepResult<Self> {
        base.validate()?;

        let name = job_name(&base.run_name, combo.index(), combo.total());
        let work_dir = base.output_dir.join(&name);
        let arguments = base
            .arguments
            .iter()
            .map(|arg| substitute(arg, &combo))
            .collect::<SweepResult<Vec<_>>>()?;

        Ok(Self {
            name,
            index: combo.index(),
            work_dir,
            parameters: combo,
            resources,
            executable: base.executable.clone(),
            template_dir: base.template_dir.clone(),
            arguments,
            modules: base.modules.clone(),
            options: SubmissionOptions::default(),
        })
    }

    pub fn with_options(mut self, options: SubmissionOptions) -> Self {
        self.options = options;
        self
    }

    /// Environment variables exporting the parameter values, in declaration
    /// order.
    pub fn environment(&self) -> Vec<(String, String)> {
        self.parameters
            .values()
            .iter()
            .map(|(name, value)| (env_name(name), value.to_string()))
            .collect()
    }

    /// Number of chained submissions, the first segment included.
    pub fn segments(&self) -> u32 {
        self.resources.continuations + 1
    }
}

/// Fail when the longest job name of a sweep of `total` jobs would not fit
/// a scheduler directive.
pub fn check_job_name_length(run_name: &str, total: usize) -> SweepResult<()> {
    let longest = job_name(run_name, total.saturating_sub(1), total);
    if longest.len() > MAX_JOB_NAME_LEN {
        return Err(SweepError::config(format!(
            "job names such as '{longest}' exceed {MAX_JOB_NAME_LEN} characters; shorten base.run_name"
        )));
    }
    Ok(())
}

/// Zero-padded job name; the width is the digit count of the last index.
pub fn job_name(run_name: &str, index: usize, total: usize) -> String {
    let width = total.saturating_sub(1).max(1).to_string().len();
    format!("{}_{:0width$}", run_name.trim(), index)
}

/// `PARAM_` plus the upper-cased name, non-identifier characters as `_`.
pub fn env_name(parameter: &str) -> String {
    let mut name = String::with_capacity(parameter.len() + 6);
    name.push_str("PARAM_");
    name.extend(parameter.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

/// Reject placeholders in `base.arguments` that name no scan parameter.
pub fn check_arguments(base: &BaseConfig, parameters: &[&str]) -> SweepResult<()> {
    for arg in &base.arguments {
        substitute_with(arg, |key| parameters.contains(&key).then(String::new))?;
    }
    Ok(())
}

/// Replace `{name}` with the value of parameter `name`.
fn substitute(template: &str, combo: &ParameterCombination) -> SweepResult<String> {
    substitute_with(template, |key| combo.get(key).map(ToString::to_string))
}

/// `${VAR}` is left untouched for the shell; any other brace pair holding an
/// identifier that `lookup` does not know is an error.
fn substitute_with<F>(template: &str, lookup: F) -> SweepResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (before, after) = rest.split_at(open);
        out.push_str(before);

        let Some(close) = after.find('}') else {
            out.push_str(after);
            return Ok(out);
        };
        let key = &after[1..close];

        if before.ends_with('$') || !is_identifier(key) {
            out.push_str(&after[..=close]);
        } else {
            match lookup(key) {
                Some(value) => out.push_str(&value),
                None => {
                    return Err(SweepError::config(format!(
                        "argument '{template}' references unknown scan parameter '{key}'"
                    )));
                }
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
