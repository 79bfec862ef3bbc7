//! Result tree for a validation run.
//!
//! A run is a tree: `ValidationRun` → `Unit` → `Test` → `SubTestResult` → `Value`.
//! Pass/fail at every level is a pure fold of the level below and is never stored
//! independently once children exist. Ordering is insertion order throughout; the
//! report renderer depends on it.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extensions recognized as embeddable report images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Value names that mark axis-label metadata for a companion pair series.
pub const AXIS_LABEL_NAMES: &[&str] = &["axis_label", "axis_labels"];

/// The payload of a single reported value.
///
/// Collaborators construct variants directly where they can; untyped producers go
/// through [`ValueData::classify`], which infers the variant from the shape of the
/// raw JSON the same way the report renderer historically did.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    /// A one-off value rendered as `name: value` text.
    Scalar(serde_json::Value),
    /// An ordered list of numbers, plotted against its index.
    Series(Vec<f64>),
    /// An ordered list of (x, y) points, plotted as a 2D line.
    Pairs(Vec<(f64, f64)>),
    /// A path to a pre-rendered graph image to embed.
    Image(PathBuf),
    /// Axis-label metadata consumed by a companion [`ValueData::Pairs`] value.
    AxisLabels { x_label: String, y_label: String },
}

impl ValueData {
    /// Infer the variant from an untyped JSON value.
    ///
    /// Classification rules, first match wins:
    /// 1. non-empty array of numbers → `Series`
    /// 2. non-empty array of 2-element numeric arrays → `Pairs`
    /// 3. string with a known image extension → `Image`
    /// 4. object carrying string `x-label` and `y-label` fields → `AxisLabels`
    /// 5. anything else → `Scalar`
    pub fn classify(raw: serde_json::Value) -> Self {
        if let Some(items) = raw.as_array() {
            if !items.is_empty() {
                if let Some(series) = all_numbers(items) {
                    return ValueData::Series(series);
                }
                if let Some(pairs) = all_pairs(items) {
                    return ValueData::Pairs(pairs);
                }
            }
        }
        if let Some(text) = raw.as_str() {
            if has_image_extension(text) {
                return ValueData::Image(PathBuf::from(text));
            }
        }
        if let Some(map) = raw.as_object() {
            if let (Some(x), Some(y)) = (
                map.get("x-label").and_then(|v| v.as_str()),
                map.get("y-label").and_then(|v| v.as_str()),
            ) {
                return ValueData::AxisLabels {
                    x_label: x.to_string(),
                    y_label: y.to_string(),
                };
            }
        }
        ValueData::Scalar(raw)
    }

    /// Convert back to the raw JSON shape produced by legacy collaborators.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ValueData::Scalar(v) => v.clone(),
            ValueData::Series(series) => serde_json::json!(series),
            ValueData::Pairs(pairs) => serde_json::Value::Array(
                pairs
                    .iter()
                    .map(|(x, y)| serde_json::json!([x, y]))
                    .collect(),
            ),
            ValueData::Image(path) => serde_json::json!(path.display().to_string()),
            ValueData::AxisLabels { x_label, y_label } => serde_json::json!({
                "x-label": x_label,
                "y-label": y_label,
            }),
        }
    }
}

impl Serialize for ValueData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(ValueData::classify(raw))
    }
}

fn all_numbers(items: &[serde_json::Value]) -> Option<Vec<f64>> {
    items.iter().map(|v| v.as_f64()).collect()
}

fn all_pairs(items: &[serde_json::Value]) -> Option<Vec<(f64, f64)>> {
    items
        .iter()
        .map(|v| {
            let pair = v.as_array()?;
            match pair.as_slice() {
                [x, y] => Some((x.as_f64()?, y.as_f64()?)),
                _ => None,
            }
        })
        .collect()
}

/// Whether a path string ends in one of [`IMAGE_EXTENSIONS`], case-insensitive.
pub fn has_image_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// One named value attached to a sub-test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Display name of the value.
    pub name: String,
    /// The payload.
    #[serde(rename = "value")]
    pub data: ValueData,
}

impl Value {
    /// A one-off scalar value.
    pub fn scalar(name: &str, data: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Scalar(data.into()),
        }
    }

    /// A numeric series value, plotted against its index.
    pub fn series(name: &str, series: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Series(series),
        }
    }

    /// An (x, y) pair-series value.
    pub fn pairs(name: &str, pairs: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Pairs(pairs),
        }
    }

    /// A reference to a pre-rendered image file.
    pub fn image(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            data: ValueData::Image(path.into()),
        }
    }

    /// Axis-label metadata for the companion pair series in the same sub-test.
    pub fn axis_labels(x_label: &str, y_label: &str) -> Self {
        Self {
            name: "axis_labels".to_string(),
            data: ValueData::AxisLabels {
                x_label: x_label.to_string(),
                y_label: y_label.to_string(),
            },
        }
    }

    /// Whether this value is axis-label metadata by the naming convention.
    pub fn is_axis_label(&self) -> bool {
        AXIS_LABEL_NAMES.contains(&self.name.as_str())
            && matches!(self.data, ValueData::AxisLabels { .. })
    }
}

/// One atomic pass/fail assertion, e.g. "pin 3" or "1.1V reference voltage".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTestResult {
    /// Name of the assertion.
    #[serde(rename = "sub-test")]
    pub sub_test: String,
    /// Whether the assertion held.
    #[serde(rename = "pass")]
    pub passed: bool,
    /// Named values recorded for the report, in insertion order.
    #[serde(default)]
    pub values: Vec<Value>,
}

impl SubTestResult {
    pub fn new(sub_test: &str, passed: bool) -> Self {
        Self {
            sub_test: sub_test.to_string(),
            passed,
            values: Vec::new(),
        }
    }

    /// Append a value, preserving insertion order.
    pub fn with_value(mut self, value: Value) -> Self {
        self.values.push(value);
        self
    }
}

/// A named capability check composed of zero or more sub-tests.
///
/// A test with no sub-test results is FAILED by definition: an aborted run leaves
/// unreached tests empty, and they must not read as vacuously passing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,
    #[serde(rename = "results", default)]
    pub subtests: Vec<SubTestResult>,
}

impl Test {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subtests: Vec::new(),
        }
    }

    /// Append the sub-test results a collaborator produced.
    pub fn extend_results(&mut self, results: impl IntoIterator<Item = SubTestResult>) {
        self.subtests.extend(results);
    }

    pub fn passed(&self) -> bool {
        test_pass(self)
    }
}

/// One validation target: a firmware binary or a full chip pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub tests: Vec<Test>,
}

impl Unit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    /// Look up a test by name.
    pub fn test(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Mutable lookup by name.
    pub fn test_mut(&mut self, name: &str) -> Option<&mut Test> {
        self.tests.iter_mut().find(|t| t.name == name)
    }

    /// Get or insert an empty test slot, preserving insertion order.
    pub fn ensure_test(&mut self, name: &str) -> &mut Test {
        if let Some(pos) = self.tests.iter().position(|t| t.name == name) {
            &mut self.tests[pos]
        } else {
            self.tests.push(Test::new(name));
            self.tests.last_mut().unwrap()
        }
    }

    pub fn passed(&self) -> bool {
        unit_pass(self)
    }
}

/// The root of one invocation's results: every unit validated in this run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub units: Vec<Unit>,
}

impl ValidationRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn unit_mut(&mut self, name: &str) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.name == name)
    }

    /// Get or insert an empty unit, preserving insertion order.
    pub fn ensure_unit(&mut self, name: &str) -> &mut Unit {
        if let Some(pos) = self.units.iter().position(|u| u.name == name) {
            &mut self.units[pos]
        } else {
            self.units.push(Unit::new(name));
            self.units.last_mut().unwrap()
        }
    }

    pub fn passed(&self) -> bool {
        self.units.iter().all(unit_pass)
    }
}

/// Pass status of a single sub-test: the stored flag, nothing more.
pub fn subtest_pass(sub: &SubTestResult) -> bool {
    sub.passed
}

/// A test passes iff it has at least one sub-test and every sub-test passed.
pub fn test_pass(test: &Test) -> bool {
    !test.subtests.is_empty() && test.subtests.iter().all(subtest_pass)
}

/// A unit passes iff no contained test is empty or failing.
pub fn unit_pass(unit: &Unit) -> bool {
    unit.tests.iter().all(test_pass)
}
