//! Parameter scan expansion.
//!
//! A [`ScanSpecification`] maps parameter names (in declaration order) to
//! axes. Each axis is a scalar, a literal list or a `start:stop:step` range.
//! [`ScanSpecification::expand`] resolves every axis into its concrete
//! values and returns an [`Expansion`]: a finite, restartable sequence of
//! [`ParameterCombination`]s that can also be indexed directly, since
//! combination `i` is the multi-radix decomposition of `i` against the axis
//! lengths.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SweepError, SweepResult};

/// Upper bound on the number of points a single scan may expand to.
pub const MAX_SCAN_POINTS: usize = 1_000_000;

/// One concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Parse a range bound: integer if it looks like one, else float.
    fn parse_number(s: &str) -> Option<ParamValue> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Some(ParamValue::Int(i));
        }
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(ParamValue::Float)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// A `start:stop:step` range. `stop` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeExpr {
    pub start: ParamValue,
    pub stop: ParamValue,
    pub step: ParamValue,
}

impl RangeExpr {
    /// Parse `start:stop:step`. Returns `None` unless all three parts are numbers.
    pub fn parse(s: &str) -> Option<RangeExpr> {
        let parts: Vec<&str> = s.split(':').collect();
        let [start, stop, step] = parts.as_slice() else {
            return None;
        };
        Some(RangeExpr {
            start: ParamValue::parse_number(start)?,
            stop: ParamValue::parse_number(stop)?,
            step: ParamValue::parse_number(step)?,
        })
    }

    /// Materialize the range. Integer ranges stay integer.
    pub fn values(&self, name: &str) -> SweepResult<Vec<ParamValue>> {
        if let (ParamValue::Int(start), ParamValue::Int(stop), ParamValue::Int(step)) =
            (&self.start, &self.stop, &self.step)
        {
            if *step <= 0 {
                return Err(SweepError::config(format!(
                    "scan axis '{name}': range step must be positive, got {step}"
                )));
            }
            let span = i128::from(*stop) - i128::from(*start);
            let count = if span <= 0 {
                0
            } else {
                (span + i128::from(*step) - 1) / i128::from(*step)
            };
            check_count(name, count > MAX_SCAN_POINTS as i128)?;
            let values: Vec<ParamValue> = (*start..*stop)
                .step_by(*step as usize)
                .map(ParamValue::Int)
                .collect();
            return Ok(values);
        }

        let (Some(start), Some(stop), Some(step)) = (
            self.start.as_f64(),
            self.stop.as_f64(),
            self.step.as_f64(),
        ) else {
            return Err(SweepError::config(format!(
                "scan axis '{name}': range bounds must be numeric"
            )));
        };
        if step <= 0.0 {
            return Err(SweepError::config(format!(
                "scan axis '{name}': range step must be positive, got {step}"
            )));
        }

        // Tolerance keeps 1.0:3.0:0.5 from gaining a spurious 3.0 element.
        let span = (stop - start) / step;
        check_count(name, !span.is_finite() || span > MAX_SCAN_POINTS as f64)?;
        let count = if span <= 0.0 {
            0
        } else {
            (span - 1e-9).ceil() as usize
        };
        Ok((0..count)
            .map(|i| ParamValue::Float(round_float(start + i as f64 * step)))
            .collect())
    }
}

fn check_count(name: &str, too_many: bool) -> SweepResult<()> {
    if too_many {
        return Err(SweepError::config(format!(
            "scan axis '{name}': range yields more than {MAX_SCAN_POINTS} values"
        )));
    }
    Ok(())
}

fn round_float(x: f64) -> f64 {
    (x * 1e12).round() / 1e12
}

/// One declared scan axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    Scalar(ParamValue),
    List(Vec<ParamValue>),
    Range(RangeExpr),
}

impl Axis {
    /// Resolve to concrete values, rejecting empty axes.
    pub fn values(&self, name: &str) -> SweepResult<Vec<ParamValue>> {
        let values = match self {
            Axis::Scalar(v) => vec![v.clone()],
            Axis::List(vs) => vs.clone(),
            Axis::Range(r) => r.values(name)?,
        };
        if values.is_empty() {
            return Err(SweepError::config(format!("scan axis '{name}' is empty")));
        }
        Ok(values)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AxisSpec {
    List(Vec<ParamValue>),
    Range(RangeExpr),
    Scalar(ParamValue),
}

impl From<AxisSpec> for Axis {
    fn from(spec: AxisSpec) -> Self {
        match spec {
            AxisSpec::List(values) => Axis::List(values),
            AxisSpec::Range(range) => Axis::Range(range),
            AxisSpec::Scalar(ParamValue::Text(s)) => match RangeExpr::parse(&s) {
                Some(range) => Axis::Range(range),
                None => Axis::Scalar(ParamValue::Text(s)),
            },
            AxisSpec::Scalar(v) => Axis::Scalar(v),
        }
    }
}

/// How multiple axes combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Full cross-product, outer-to-inner in declaration order.
    #[default]
    Product,
    /// Axes advance in lockstep; varying axes must share one length.
    Zip,
}

/// Declarative scan: parameter name to axis, in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSpecification {
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(deserialize_with = "deserialize_axes")]
    parameters: Vec<(String, Axis)>,
}

impl ScanSpecification {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            parameters: Vec::new(),
        }
    }

    /// Add an axis. Later declarations nest inside earlier ones.
    pub fn with_axis(mut self, name: impl Into<String>, axis: Axis) -> Self {
        self.parameters.push((name.into(), axis));
        self
    }

    pub fn parameters(&self) -> &[(String, Axis)] {
        &self.parameters
    }

    /// Resolve and validate every axis, producing the expansion.
    pub fn expand(&self) -> SweepResult<Expansion> {
        if self.parameters.is_empty() {
            return Err(SweepError::config(
                "scan must declare at least one parameter",
            ));
        }

        let mut axes: Vec<ResolvedAxis> = Vec::with_capacity(self.parameters.len());
        for (name, axis) in &self.parameters {
            if axes.iter().any(|a| &a.name == name) {
                return Err(SweepError::config(format!(
                    "scan parameter '{name}' is declared twice"
                )));
            }
            axes.push(ResolvedAxis {
                name: name.clone(),
                values: axis.values(name)?,
            });
        }

        let len = match self.mode {
            ScanMode::Product => axes
                .iter()
                .try_fold(1usize, |acc, axis| {
                    acc.checked_mul(axis.values.len())
                        .filter(|&len| len <= MAX_SCAN_POINTS)
                })
                .ok_or_else(|| {
                    SweepError::config(format!(
                        "scan cross-product exceeds {MAX_SCAN_POINTS} points"
                    ))
                })?,
            ScanMode::Zip => {
                let varying: Vec<&ResolvedAxis> =
                    axes.iter().filter(|a| a.values.len() > 1).collect();
                match varying.first() {
                    None => 1,
                    Some(first) => {
                        let len = first.values.len();
                        if let Some(odd) = varying.iter().find(|a| a.values.len() != len) {
                            return Err(SweepError::config(format!(
                                "zipped scan axes differ in length: '{}' has {} values, '{}' has {}",
                                first.name,
                                len,
                                odd.name,
                                odd.values.len()
                            )));
                        }
                        len
                    }
                }
            }
        };

        Ok(Expansion {
            mode: self.mode,
            axes,
            len,
        })
    }
}

fn deserialize_axes<'de, D>(deserializer: D) -> Result<Vec<(String, Axis)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AxesVisitor;

    impl<'de> Visitor<'de> for AxesVisitor {
        type Value = Vec<(String, Axis)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping from parameter name to value, list or range")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut axes: Vec<(String, Axis)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, spec)) = map.next_entry::<String, AxisSpec>()? {
                if axes.iter().any(|(n, _)| n == &name) {
                    return Err(de::Error::custom(format!(
                        "scan parameter '{name}' is declared twice"
                    )));
                }
                axes.push((name, spec.into()));
            }
            Ok(axes)
        }
    }

    deserializer.deserialize_map(AxesVisitor)
}

/// An axis with its concrete values.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAxis {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// The validated, finite sequence of combinations for a scan.
///
/// Holds no iteration state: iterating twice yields the same sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    mode: ScanMode,
    axes: Vec<ResolvedAxis>,
    len: usize,
}

impl Expansion {
    /// A run with no scan: exactly one combination with no parameters.
    pub fn single() -> Self {
        Self {
            mode: ScanMode::Product,
            axes: Vec::new(),
            len: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn axes(&self) -> &[ResolvedAxis] {
        &self.axes
    }

    /// Number of axes with more than one value.
    pub fn dimensionality(&self) -> usize {
        self.axes.iter().filter(|a| a.values.len() > 1).count()
    }

    /// Decode combination `index`.
    pub fn get(&self, index: usize) -> Option<ParameterCombination> {
        if index >= self.len {
            return None;
        }

        let values = match self.mode {
            ScanMode::Product => {
                let mut remainder = index;
                let mut digits = vec![0usize; self.axes.len()];
                for (slot, axis) in digits.iter_mut().zip(&self.axes).rev() {
                    let radix = axis.values.len();
                    *slot = remainder % radix;
                    remainder /= radix;
                }
                self.axes
                    .iter()
                    .zip(digits)
                    .map(|(axis, d)| (axis.name.clone(), axis.values[d].clone()))
                    .collect()
            }
            ScanMode::Zip => self
                .axes
                .iter()
                .map(|axis| {
                    let d = if axis.values.len() == 1 { 0 } else { index };
                    (axis.name.clone(), axis.values[d].clone())
                })
                .collect(),
        };

        Some(ParameterCombination {
            index,
            total: self.len,
            values,
        })
    }

    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            expansion: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a Expansion {
    type Item = ParameterCombination;
    type IntoIter = Combinations<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over an [`Expansion`].
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    expansion: &'a Expansion,
    next: usize,
}

impl Iterator for Combinations<'_> {
    type Item = ParameterCombination;

    fn next(&mut self) -> Option<Self::Item> {
        let combo = self.expansion.get(self.next)?;
        self.next += 1;
        Some(combo)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.expansion.len.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}

/// One concrete point of the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCombination {
    index: usize,
    total: usize,
    values: Vec<(String, ParamValue)>,
}

impl ParameterCombination {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Size of the expansion this combination belongs to.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(String, ParamValue)] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `name=value` pairs joined by commas, for logs.
    pub fn label(&self) -> String {
        self.values
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Serializes as a map of parameter values in declaration order.
impl Serialize for ParameterCombination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Axis {
        Axis::List(values.iter().copied().map(ParamValue::Int).collect())
    }

    #[test]
    fn test_single_axis() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("temperature", ints(&[100, 200, 300]));
        let expansion = spec.expand().unwrap();

        assert_eq!(expansion.len(), 3);
        assert_eq!(expansion.dimensionality(), 1);
        let temps: Vec<_> = expansion
            .iter()
            .map(|c| c.get("temperature").cloned().unwrap())
            .collect();
        assert_eq!(
            temps,
            vec![ParamValue::Int(100), ParamValue::Int(200), ParamValue::Int(300)]
        );
    }

    #[test]
    fn test_cross_product_order() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("a", ints(&[1, 2]))
            .with_axis("b", ints(&[10, 20, 30]));
        let expansion = spec.expand().unwrap();

        assert_eq!(expansion.len(), 6);
        assert_eq!(expansion.dimensionality(), 2);
        let labels: Vec<String> = expansion.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec!["a=1,b=10", "a=1,b=20", "a=1,b=30", "a=2,b=10", "a=2,b=20", "a=2,b=30"]
        );
        assert_eq!(expansion.get(4).unwrap().label(), "a=2,b=20");
        assert!(expansion.get(6).is_none());
    }

    #[test]
    fn test_scalar_only_scan_yields_one() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("species", Axis::Scalar("argon".into()))
            .with_axis("seed", Axis::Scalar(ParamValue::Int(7)));
        let expansion = spec.expand().unwrap();
        assert_eq!(expansion.len(), 1);
        assert_eq!(expansion.dimensionality(), 0);
        assert_eq!(expansion.get(0).unwrap().label(), "species=argon,seed=7");
    }

    #[test]
    fn test_zip_pairs_by_position() {
        let spec = ScanSpecification::new(ScanMode::Zip)
            .with_axis("x", ints(&[1, 2]))
            .with_axis("y", ints(&[10, 20]))
            .with_axis("tag", Axis::Scalar("z".into()));
        let labels: Vec<String> = spec.expand().unwrap().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["x=1,y=10,tag=z", "x=2,y=20,tag=z"]);
    }

    #[test]
    fn test_zip_length_mismatch() {
        let spec = ScanSpecification::new(ScanMode::Zip)
            .with_axis("x", ints(&[1, 2]))
            .with_axis("y", ints(&[10, 20, 30]));
        let err = spec.expand().unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("a", ints(&[1]))
            .with_axis("b", Axis::List(Vec::new()));
        assert!(matches!(spec.expand(), Err(SweepError::Configuration(_))));
    }

    #[test]
    fn test_no_parameters_rejected() {
        let spec = ScanSpecification::new(ScanMode::Product);
        assert!(spec.expand().is_err());
    }

    #[test]
    fn test_integer_range() {
        let range = RangeExpr::parse("0:10:3").unwrap();
        assert_eq!(
            range.values("n").unwrap(),
            [0, 3, 6, 9].map(ParamValue::Int).to_vec()
        );
        assert!(RangeExpr::parse("0:10:0").unwrap().values("n").is_err());
        assert!(RangeExpr::parse("5:5:1").unwrap().values("n").unwrap().is_empty());
    }

    #[test]
    fn test_float_range() {
        let range = RangeExpr::parse("1.0:3.0:0.5").unwrap();
        assert_eq!(
            range.values("density").unwrap(),
            [1.0, 1.5, 2.0, 2.5].map(ParamValue::Float).to_vec()
        );
        let range = RangeExpr::parse("0:1:0.1").unwrap();
        let values = range.values("x").unwrap();
        assert_eq!(values.len(), 10);
        assert_eq!(values[3], ParamValue::Float(0.3));
    }

    #[test]
    fn test_oversized_ranges_rejected() {
        for range in ["0:1e300:1", "-1e308:1e308:1e-300", "0:9223372036854775807:1", "0:2000001:2"] {
            let spec = ScanSpecification::new(ScanMode::Product)
                .with_axis("x", Axis::Range(RangeExpr::parse(range).unwrap()));
            let err = spec.expand().unwrap_err();
            assert!(matches!(err, SweepError::Configuration(_)), "{range}");
        }

        let at_limit = ScanSpecification::new(ScanMode::Product)
            .with_axis("x", Axis::Range(RangeExpr::parse("0:2000000:2").unwrap()));
        assert_eq!(at_limit.expand().unwrap().len(), MAX_SCAN_POINTS);
    }

    #[test]
    fn test_cross_product_limit() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("a", Axis::Range(RangeExpr::parse("0:1001:1").unwrap()))
            .with_axis("b", Axis::Range(RangeExpr::parse("0:1000:1").unwrap()));
        let err = spec.expand().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_range_parse_rejects_non_numeric() {
        assert!(RangeExpr::parse("a:b:c").is_none());
        assert!(RangeExpr::parse("1:2").is_none());
    }

    #[test]
    fn test_restartable() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("a", ints(&[1, 2, 3]))
            .with_axis("b", ints(&[4, 5]));
        let expansion = spec.expand().unwrap();
        let first: Vec<_> = expansion.iter().collect();
        let second: Vec<_> = (&expansion).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(expansion.iter().len(), 6);
    }

    #[test]
    fn test_yaml_preserves_declaration_order() {
        let yaml = r#"
mode: product
parameters:
  zeta: [1, 2]
  alpha: "0:3:1"
  name: run
"#;
        let spec: ScanSpecification = serde_yaml_ng::from_str(yaml).unwrap();
        let names: Vec<&str> = spec.parameters().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "name"]);
        assert!(matches!(spec.parameters()[1].1, Axis::Range(_)));
        assert_eq!(spec.expand().unwrap().len(), 6);
    }

    #[test]
    fn test_yaml_range_mapping_and_zip() {
        let yaml = r#"
mode: zip
parameters:
  x: {start: 0, stop: 4, step: 2}
  y: [a, b]
"#;
        let spec: ScanSpecification = serde_yaml_ng::from_str(yaml).unwrap();
        let labels: Vec<String> = spec.expand().unwrap().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["x=0,y=a", "x=2,y=b"]);
    }

    #[test]
    fn test_yaml_duplicate_parameter() {
        let yaml = "parameters:\n  a: 1\n  a: 2\n";
        assert!(serde_yaml_ng::from_str::<ScanSpecification>(yaml).is_err());
    }

    #[test]
    fn test_combination_serializes_in_order() {
        let spec = ScanSpecification::new(ScanMode::Product)
            .with_axis("zeta", ints(&[1]))
            .with_axis("alpha", Axis::Scalar("x".into()));
        let combo = spec.expand().unwrap().get(0).unwrap();
        assert_eq!(
            serde_json::to_string(&combo).unwrap(),
            r#"{"zeta":1,"alpha":"x"}"#
        );
    }
}
