//! Wall-time and memory quantities.
//!
//! Both types parse the spellings HPC users already write in batch scripts
//! (`1-12:00:00`, `32G`) and keep a single integer representation internally
//! so that allocation arithmetic never deals with strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 86_400;

/// A wall-clock duration with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "WallTimeSpec", into = "String")]
pub struct WallTime(u64);

/// Accepted YAML spellings of a wall-time: bare minutes or a Slurm-style string.
#[derive(Deserialize)]
#[serde(untagged)]
enum WallTimeSpec {
    Minutes(u64),
    Text(String),
}

impl TryFrom<WallTimeSpec> for WallTime {
    type Error = SweepError;

    fn try_from(spec: WallTimeSpec) -> SweepResult<Self> {
        match spec {
            WallTimeSpec::Minutes(m) => m
                .checked_mul(SECS_PER_MINUTE)
                .map(WallTime)
                .ok_or_else(|| SweepError::config(format!("wall-time of {m} minutes is too large"))),
            WallTimeSpec::Text(s) => s.parse(),
        }
    }
}

impl From<WallTime> for String {
    fn from(w: WallTime) -> Self {
        w.to_string()
    }
}

impl WallTime {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes * SECS_PER_MINUTE)
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(hours * SECS_PER_HOUR)
    }

    pub const fn from_days(days: u64) -> Self {
        Self(days * SECS_PER_DAY)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Split into `(hours, minutes, seconds)` with unbounded hours.
    pub fn hms(&self) -> (u64, u64, u64) {
        (
            self.0 / SECS_PER_HOUR,
            (self.0 % SECS_PER_HOUR) / SECS_PER_MINUTE,
            self.0 % SECS_PER_MINUTE,
        )
    }

    /// Split into `(days, hours, minutes, seconds)`.
    pub fn dhms(&self) -> (u64, u64, u64, u64) {
        let (hours, minutes, seconds) = self.hms();
        (hours / 24, hours % 24, minutes, seconds)
    }

    /// Number of segments of length `self` needed to cover `total`.
    pub fn segments_to_cover(&self, total: WallTime) -> u64 {
        if self.0 == 0 {
            return 0;
        }
        total.0.div_ceil(self.0)
    }

    /// `self * factor`, rounded down to whole seconds. `factor` is clamped
    /// to `0.0..=1.0`.
    pub fn scaled_down(&self, factor: f64) -> WallTime {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        WallTime((self.0 as f64 * factor).floor() as u64)
    }

    /// Saturating multiplication, used for CPU-time estimates.
    pub fn saturating_mul(&self, factor: u64) -> WallTime {
        WallTime(self.0.saturating_mul(factor))
    }
}

/// Formats as `HH:MM:SS`, or `D-HH:MM:SS` from one day upwards.
impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (days, hours, minutes, seconds) = self.dhms();
        if days > 0 {
            write!(f, "{days}-{hours:02}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

/// Parses the Slurm time grammar: `MM`, `MM:SS`, `HH:MM:SS`, `D-HH`,
/// `D-HH:MM` and `D-HH:MM:SS`.
impl FromStr for WallTime {
    type Err = SweepError;

    fn from_str(s: &str) -> SweepResult<Self> {
        let s = s.trim();
        let invalid = || {
            SweepError::config(format!(
                "invalid wall-time '{s}': expected MM, MM:SS, HH:MM:SS, D-HH, D-HH:MM or D-HH:MM:SS"
            ))
        };
        let field = |part: &str| -> SweepResult<u64> {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u64>().map_err(|_| invalid())
        };
        let bounded = |value: u64, limit: u64| -> SweepResult<u64> {
            if value < limit { Ok(value) } else { Err(invalid()) }
        };

        if let Some((days, rest)) = s.split_once('-') {
            let days = field(days)?;
            let parts: Vec<&str> = rest.split(':').collect();
            let (hours, minutes, seconds) = match parts.as_slice() {
                [h] => (field(h)?, 0, 0),
                [h, m] => (field(h)?, field(m)?, 0),
                [h, m, sec] => (field(h)?, field(m)?, field(sec)?),
                _ => return Err(invalid()),
            };
            let secs = combine(&[
                (days, SECS_PER_DAY),
                (bounded(hours, 24)?, SECS_PER_HOUR),
                (bounded(minutes, 60)?, SECS_PER_MINUTE),
                (bounded(seconds, 60)?, 1),
            ])
            .ok_or_else(invalid)?;
            return Ok(WallTime(secs));
        }

        let parts: Vec<&str> = s.split(':').collect();
        let secs = match parts.as_slice() {
            [m] => combine(&[(field(m)?, SECS_PER_MINUTE)]),
            [m, sec] => combine(&[
                (field(m)?, SECS_PER_MINUTE),
                (bounded(field(sec)?, 60)?, 1),
            ]),
            [h, m, sec] => combine(&[
                (field(h)?, SECS_PER_HOUR),
                (bounded(field(m)?, 60)?, SECS_PER_MINUTE),
                (bounded(field(sec)?, 60)?, 1),
            ]),
            _ => return Err(invalid()),
        }
        .ok_or_else(invalid)?;
        Ok(WallTime(secs))
    }
}

/// Sum of `value * scale` terms, or `None` on overflow.
fn combine(terms: &[(u64, u64)]) -> Option<u64> {
    terms.iter().try_fold(0u64, |acc, &(value, scale)| {
        value.checked_mul(scale).and_then(|v| acc.checked_add(v))
    })
}

/// A memory quantity in mebibytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "MemorySpec", into = "String")]
pub struct Memory(u64);

/// Bare integers are gigabytes, strings carry a unit suffix.
#[derive(Deserialize)]
#[serde(untagged)]
enum MemorySpec {
    Gigabytes(u64),
    Text(String),
}

impl TryFrom<MemorySpec> for Memory {
    type Error = SweepError;

    fn try_from(spec: MemorySpec) -> SweepResult<Self> {
        match spec {
            MemorySpec::Gigabytes(gb) => gb
                .checked_mul(1024)
                .map(Memory)
                .ok_or_else(|| SweepError::config(format!("memory of {gb}G is too large"))),
            MemorySpec::Text(s) => s.parse(),
        }
    }
}

impl From<Memory> for String {
    fn from(m: Memory) -> Self {
        m.to_string()
    }
}

impl Memory {
    pub const ZERO: Memory = Memory(0);

    pub const fn from_mb(mb: u64) -> Self {
        Self(mb)
    }

    pub const fn from_gb(gb: u64) -> Self {
        Self(gb * 1024)
    }

    pub fn as_mb(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Share of this amount per part, rounded up so no part gets less.
    pub fn div_ceil(&self, parts: u32) -> Memory {
        Memory(self.0.div_ceil(u64::from(parts.max(1))))
    }

    pub fn saturating_mul(&self, factor: u32) -> Memory {
        Memory(self.0.saturating_mul(u64::from(factor)))
    }
}

/// Formats whole gibibytes as `NG`, anything else as `NM`.
impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 && self.0 % 1024 == 0 {
            write!(f, "{}G", self.0 / 1024)
        } else {
            write!(f, "{}M", self.0)
        }
    }
}

impl FromStr for Memory {
    type Err = SweepError;

    fn from_str(s: &str) -> SweepResult<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let upper = upper.strip_suffix('B').unwrap_or(&upper);
        let split = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (digits, unit) = upper.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| SweepError::config(format!("invalid memory quantity '{trimmed}'")))?;
        let scale = match unit {
            "" | "G" => 1024,
            "M" => 1,
            "T" => 1024 * 1024,
            _ => {
                return Err(SweepError::config(format!(
                    "invalid memory unit in '{trimmed}': expected M, G or T"
                )));
            }
        };
        value
            .checked_mul(scale)
            .map(Memory)
            .ok_or_else(|| SweepError::config(format!("memory quantity '{trimmed}' is too large")))
    }
}
