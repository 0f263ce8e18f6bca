//! Shell quoting and directive value checks.

use std::path::Path;

use crate::error::{SweepError, SweepResult};
use crate::job::MAX_JOB_NAME_LEN;

/// Quote a word for POSIX shells.
///
/// The result is always single-quoted, so nothing inside is expanded;
/// embedded single quotes become `'\''`.
pub fn quote(word: &str) -> String {
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote a path for POSIX shells.
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Job names are written verbatim; a name the scheduler would truncate or
/// rewrite could collide with another job of the same sweep.
pub fn check_job_name<'a>(variant: &str, name: &'a str) -> SweepResult<&'a str> {
    if name.is_empty() || !name.chars().all(is_job_name_char) {
        return Err(SweepError::render(
            variant,
            format!(
                "job name '{}' contains characters the directive cannot carry",
                name.escape_debug()
            ),
        ));
    }
    if name.len() > MAX_JOB_NAME_LEN {
        return Err(SweepError::render(
            variant,
            format!(
                "job name '{name}' is {} characters long, the limit is {MAX_JOB_NAME_LEN}",
                name.len()
            ),
        ));
    }
    Ok(name)
}

pub(crate) fn is_job_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Directive values (queues, accounts, QOS) are written unquoted, so only a
/// conservative character set is allowed.
pub fn check_token(variant: &str, field: &str, value: &str) -> SweepResult<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'));
    if valid {
        Ok(())
    } else {
        Err(SweepError::render(
            variant,
            format!("{field} '{value}' contains characters the directive cannot carry"),
        ))
    }
}

/// Module names may contain version separators but nothing the shell would
/// interpret.
pub fn check_module(variant: &str, module: &str) -> SweepResult<()> {
    let valid = !module.is_empty()
        && module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '/'));
    if valid {
        Ok(())
    } else {
        Err(SweepError::render(
            variant,
            format!("module name '{module}' is not a valid module identifier"),
        ))
    }
}

pub fn check_email(variant: &str, email: &str) -> SweepResult<()> {
    let valid = email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@')
        && email
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, '\'' | '"' | '\\' | '`' | '$' | ';'));
    if valid {
        Ok(())
    } else {
        Err(SweepError::render(
            variant,
            format!("'{email}' is not a valid email address"),
        ))
    }
}

/// Paths end up in directive lines, where neither quoting nor line breaks
/// are understood.
pub fn check_directive_path(variant: &str, path: &Path) -> SweepResult<String> {
    let text = path.to_string_lossy();
    if text.is_empty() || text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(SweepError::render(
            variant,
            format!("path '{}' cannot appear in a directive", text.escape_debug()),
        ));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(quote("a b;c"), "'a b;c'");
    }

    #[test]
    fn test_check_job_name() {
        assert_eq!(check_job_name("slurm", "scan_01").unwrap(), "scan_01");
        assert_eq!(check_job_name("pbs", "t-scan_9").unwrap(), "t-scan_9");
        assert!(check_job_name("slurm", &"a".repeat(64)).is_ok());

        for bad in ["my job", "scan\n#SBATCH", "", "temp\u{e9}rature"] {
            let err = check_job_name("slurm", bad).unwrap_err();
            assert!(matches!(err, SweepError::Render { .. }), "{bad:?}");
        }
        let err = check_job_name("loadleveler", &"a".repeat(65)).unwrap_err();
        assert!(err.to_string().contains("limit is 64"));
    }

    #[test]
    fn test_checks() {
        assert!(check_token("slurm", "queue", "skl_fua_prod").is_ok());
        assert!(check_token("slurm", "queue", "prod\n#SBATCH --x").is_err());
        assert!(check_token("slurm", "queue", "").is_err());
        assert!(check_module("slurm", "intel/pe-xe-2020--binary").is_ok());
        assert!(check_module("slurm", "intel; rm").is_err());
        assert!(check_email("slurm", "me@example.org").is_ok());
        assert!(check_email("slurm", "me at example").is_err());
        assert!(check_directive_path("pbs", &PathBuf::from("/scratch/run_1")).is_ok());
        assert!(check_directive_path("pbs", &PathBuf::from("/scratch/my run")).is_err());
        assert!(check_directive_path("pbs", &PathBuf::from("/scratch/a\nb")).is_err());
    }
}
