//! Self-contained HTML report rendering.
//!
//! Walks the `ValidationRun` tree depth-first and emits one styled document with
//! inline CSS, inline SVG graphs, and base64-embedded images, so the artifact can
//! be mailed around or archived as a single file. Pass/fail badges come from the
//! aggregation functions in [`crate::results`]; the renderer never derives status
//! by its own logic.
//!
//! Rendering is safe to call on a partially populated tree. Failure paths in the
//! sequencer render whatever exists before bailing out, so a human always has an
//! artifact to inspect.

use crate::plot::{line_plot, pair_plot};
use crate::results::{test_pass, unit_pass, SubTestResult, Test, Unit, ValidationRun, Value, ValueData};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Sentinel used when a pair series has no bound axis-label metadata.
pub const NO_LABEL_SENTINEL: &str = "no label given";

/// Errors from writing the rendered report to disk.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The report could not be written to the requested location.
    #[error("failed to write report to '{path}': {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// A rendered report plus the non-fatal diagnostics produced while rendering.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    /// The complete HTML document.
    pub html: String,
    /// Render warnings: missing axis labels, unreadable image paths.
    pub warnings: Vec<String>,
}

const CSS: &str = "
<style>
    body {
        font-family: Arial, sans-serif;
        padding: 30px;
        background-color: #f7f7f7;
    }
    .unit-test {
        background: #ffffff;
        border: 1px solid #ddd;
        border-left: 8px solid #2c3e50;
        border-radius: 10px;
        padding: 20px;
        margin-bottom: 40px;
        box-shadow: 0 2px 6px rgba(0, 0, 0, 0.05);
    }
    .test {
        border: 1px solid #ccc;
        padding: 10px;
        margin-top: 15px;
        border-radius: 6px;
        background-color: #fcfcfc;
    }
    .passed { color: green; font-weight: bold; }
    .failed { color: red; font-weight: bold; }
    .sub-test { margin-left: 20px; margin-top: 10px; }
    .values { margin-left: 40px; font-size: 90%; }
    svg, img { margin-left: 40px; max-width: 600px; border: 1px solid #aaa; margin-top: 5px; }
    h1 { color: #2c3e50; }
    h2 { color: #34495e; }
    h3 { margin-bottom: 8px; }
</style>
";

/// Render the whole run to a single HTML document.
///
/// Pure with respect to the tree: no mutation, no I/O. Diagnostics are returned
/// alongside the document instead of being raised.
pub fn render(run: &ValidationRun) -> RenderedReport {
    let mut html = String::new();
    let mut warnings = Vec::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset='utf-8'>\n");
    html.push_str("<title>Test Results Report</title>\n");
    html.push_str(CSS);
    html.push_str("</head>\n<body>\n<h1>Test Results Report</h1>\n");

    let now = chrono::Utc::now().format("%B %d, %Y — %H:%M UTC");
    let _ = writeln!(html, "<p><em>Generated on: {now}</em></p>");

    for unit in &run.units {
        render_unit(unit, &mut html, &mut warnings);
    }

    html.push_str("</body></html>\n");
    RenderedReport { html, warnings }
}

/// Render the run and write it to `path`.
///
/// The document is written to a temporary sibling first and renamed into place,
/// so an interrupted write never leaves a truncated report behind. The in-memory
/// tree is untouched either way.
pub fn write_report(run: &ValidationRun, path: &Path) -> RenderResult<RenderedReport> {
    let report = render(run);
    for warning in &report.warnings {
        warn!("render: {warning}");
    }

    let tmp = path.with_extension("html.tmp");
    let write_err = |source| RenderError::WriteFailed {
        path: path.display().to_string(),
        source,
    };
    fs::write(&tmp, &report.html).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;

    info!("HTML report saved to '{}'", path.display());
    Ok(report)
}

fn render_unit(unit: &Unit, html: &mut String, warnings: &mut Vec<String>) {
    let (status, class) = if unit_pass(unit) {
        ("✅ PASSED", "passed")
    } else {
        ("❌ FAILED", "failed")
    };
    let _ = writeln!(
        html,
        "<div class='unit-test'><h2>{} - <span class='{class}'>{status}</span></h2>",
        escape(&unit.name)
    );

    for test in &unit.tests {
        render_test(test, html, warnings);
    }

    html.push_str("</div>\n");
}

fn render_test(test: &Test, html: &mut String, warnings: &mut Vec<String>) {
    if test.subtests.is_empty() {
        let _ = writeln!(
            html,
            "<div class='test'><h3>{} - <span class='failed'>FAILED</span></h3>",
            escape(&test.name)
        );
        html.push_str("<p>No sub-tests provided.</p></div>\n");
        return;
    }

    let (status, class) = if test_pass(test) {
        ("PASSED", "passed")
    } else {
        ("FAILED", "failed")
    };
    let _ = writeln!(
        html,
        "<div class='test'><h3>{} - <span class='{class}'>{status}</span></h3>",
        escape(&test.name)
    );

    for sub in &test.subtests {
        render_sub_test(sub, html, warnings);
    }

    html.push_str("</div>\n");
}

fn render_sub_test(sub: &SubTestResult, html: &mut String, warnings: &mut Vec<String>) {
    let (status, class) = if sub.passed {
        ("PASSED", "passed")
    } else {
        ("FAILED", "failed")
    };
    let _ = writeln!(
        html,
        "<div class='sub-test'><strong>{}</strong>: <span class='{class}'>{status}</span></div>",
        escape(&sub.sub_test)
    );

    if sub.values.is_empty() {
        return;
    }

    let (bindings, consumed) = bind_axis_labels(&sub.values);

    html.push_str("<ul class='values'>\n");
    for (idx, value) in sub.values.iter().enumerate() {
        if consumed.contains(&idx) {
            // Axis-label metadata already shown on its companion plot.
            continue;
        }
        match &value.data {
            ValueData::Series(series) => {
                let _ = writeln!(
                    html,
                    "<li>{}:<br>{}</li>",
                    escape(&value.name),
                    line_plot(series, &value.name)
                );
            }
            ValueData::Pairs(pairs) => {
                let (x_label, y_label) = match bindings.get(&idx).map(|&j| &sub.values[j].data) {
                    Some(ValueData::AxisLabels { x_label, y_label }) => {
                        (x_label.as_str(), y_label.as_str())
                    }
                    _ => {
                        warnings.push(format!(
                            "no axis labels given for value '{}' in sub-test '{}'",
                            value.name, sub.sub_test
                        ));
                        (NO_LABEL_SENTINEL, NO_LABEL_SENTINEL)
                    }
                };
                let _ = writeln!(
                    html,
                    "<li>{}:<br>{}</li>",
                    escape(&value.name),
                    pair_plot(pairs, &value.name, x_label, y_label)
                );
            }
            ValueData::Image(path) => match embed_image(path) {
                Ok(data_uri) => {
                    let _ = writeln!(
                        html,
                        "<li>{}:<br><img src='{data_uri}' alt='{}'></li>",
                        escape(&value.name),
                        escape(&value.name)
                    );
                }
                Err(err) => {
                    warnings.push(format!(
                        "could not embed image '{}' for value '{}': {err}",
                        path.display(),
                        value.name
                    ));
                    let _ = writeln!(
                        html,
                        "<li>{}: <span class='failed'>FAILED</span> — could not embed image '{}'</li>",
                        escape(&value.name),
                        escape(&path.display().to_string())
                    );
                }
            },
            // Unbound axis labels are shown as leftover text so nothing is
            // silently dropped; scalars render as plain name/value lines.
            ValueData::AxisLabels { .. } | ValueData::Scalar(_) => {
                let _ = writeln!(
                    html,
                    "<li>{}: {}</li>",
                    escape(&value.name),
                    escape(&scalar_text(&value.data))
                );
            }
        }
    }
    html.push_str("</ul>\n");
}

/// Associate each pair-series value with at most one axis-label value.
///
/// For each pair series (in order), the first unconsumed axis-label value after it
/// wins; if there is none, the search wraps to the values before it. Each label is
/// consumed at most once. Returns the pair→label bindings and the consumed set.
fn bind_axis_labels(values: &[Value]) -> (HashMap<usize, usize>, HashSet<usize>) {
    let mut bindings = HashMap::new();
    let mut consumed = HashSet::new();

    for (i, value) in values.iter().enumerate() {
        if !matches!(value.data, ValueData::Pairs(_)) {
            continue;
        }
        let candidate = (i + 1..values.len())
            .chain(0..i)
            .filter(|j| !consumed.contains(j))
            .find(|&j| values[j].is_axis_label());
        if let Some(j) = candidate {
            bindings.insert(i, j);
            consumed.insert(j);
        }
    }

    (bindings, consumed)
}

fn embed_image(path: &Path) -> Result<String, std::io::Error> {
    let bytes = fs::read(path)?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn scalar_text(data: &ValueData) -> String {
    match data {
        // Bare strings print without JSON quoting, matching the legacy reports.
        ValueData::Scalar(serde_json::Value::String(s)) => s.clone(),
        other => other.to_json().to_string(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
