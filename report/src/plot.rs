//! Inline SVG line plots for report values.
//!
//! Series and pair-series values are graphed as self-contained `<svg>` fragments so
//! the HTML report needs no external assets and no plotting toolchain on the bench
//! machine.

use std::fmt::Write;

const PLOT_WIDTH: f64 = 600.0;
const PLOT_HEIGHT: f64 = 360.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 55.0;
const TICK_COUNT: usize = 5;

/// Plot a numeric series against its index.
pub fn line_plot(series: &[f64], title: &str) -> String {
    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();
    plot_points(&points, title, "Index", "Value")
}

/// Plot an (x, y) pair series with explicit axis labels.
pub fn pair_plot(points: &[(f64, f64)], title: &str, x_label: &str, y_label: &str) -> String {
    plot_points(points, title, x_label, y_label)
}

fn plot_points(points: &[(f64, f64)], title: &str, x_label: &str, y_label: &str) -> String {
    let (x_min, x_max) = padded_range(points.iter().map(|p| p.0));
    let (y_min, y_max) = padded_range(points.iter().map(|p| p.1));

    let inner_w = PLOT_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let inner_h = PLOT_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let to_px = |(x, y): (f64, f64)| {
        let px = MARGIN_LEFT + (x - x_min) / (x_max - x_min) * inner_w;
        let py = PLOT_HEIGHT - MARGIN_BOTTOM - (y - y_min) / (y_max - y_min) * inner_h;
        (px, py)
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg width="{PLOT_WIDTH}" height="{PLOT_HEIGHT}" viewBox="0 0 {PLOT_WIDTH} {PLOT_HEIGHT}" xmlns="http://www.w3.org/2000/svg">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);

    // Plot frame
    let _ = writeln!(
        svg,
        r##"<rect x="{MARGIN_LEFT}" y="{MARGIN_TOP}" width="{inner_w}" height="{inner_h}" fill="none" stroke="#444" stroke-width="1"/>"##
    );

    // Axis ticks and grid lines
    for i in 0..=TICK_COUNT {
        let frac = i as f64 / TICK_COUNT as f64;

        let x_val = x_min + frac * (x_max - x_min);
        let px = MARGIN_LEFT + frac * inner_w;
        let y0 = PLOT_HEIGHT - MARGIN_BOTTOM;
        let _ = writeln!(
            svg,
            r##"<line x1="{px:.1}" y1="{MARGIN_TOP}" x2="{px:.1}" y2="{y0}" stroke="#ddd" stroke-width="0.5"/>"##
        );
        let _ = writeln!(
            svg,
            r##"<text x="{px:.1}" y="{:.1}" font-size="11" text-anchor="middle" fill="#333">{}</text>"##,
            y0 + 16.0,
            tick_label(x_val)
        );

        let y_val = y_min + frac * (y_max - y_min);
        let py = PLOT_HEIGHT - MARGIN_BOTTOM - frac * inner_h;
        let _ = writeln!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{py:.1}" x2="{:.1}" y2="{py:.1}" stroke="#ddd" stroke-width="0.5"/>"##,
            MARGIN_LEFT + inner_w
        );
        let _ = writeln!(
            svg,
            r##"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end" fill="#333">{}</text>"##,
            MARGIN_LEFT - 6.0,
            py + 4.0,
            tick_label(y_val)
        );
    }

    // Data polyline with point markers
    if !points.is_empty() {
        let mut path = String::new();
        for (i, point) in points.iter().enumerate() {
            let (px, py) = to_px(*point);
            let _ = write!(path, "{}{px:.2},{py:.2}", if i == 0 { "" } else { " " });
        }
        let _ = writeln!(
            svg,
            r##"<polyline points="{path}" fill="none" stroke="#1f77b4" stroke-width="1.5"/>"##
        );
        for point in points {
            let (px, py) = to_px(*point);
            let _ = writeln!(
                svg,
                r##"<circle cx="{px:.2}" cy="{py:.2}" r="2" fill="#1f77b4"/>"##
            );
        }
    }

    // Title and axis labels
    let _ = writeln!(
        svg,
        r##"<text x="{:.1}" y="22" font-size="14" font-weight="bold" text-anchor="middle" fill="#2c3e50">{}</text>"##,
        MARGIN_LEFT + inner_w / 2.0,
        xml_escape(title)
    );
    let _ = writeln!(
        svg,
        r##"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle" fill="#333">{}</text>"##,
        MARGIN_LEFT + inner_w / 2.0,
        PLOT_HEIGHT - 12.0,
        xml_escape(x_label)
    );
    let _ = writeln!(
        svg,
        r##"<text x="16" y="{:.1}" font-size="12" text-anchor="middle" fill="#333" transform="rotate(-90 16 {:.1})">{}</text>"##,
        MARGIN_TOP + inner_h / 2.0,
        MARGIN_TOP + inner_h / 2.0,
        xml_escape(y_label)
    );

    svg.push_str("</svg>\n");
    svg
}

/// Data range with a small margin, widened when the data is flat or empty so the
/// pixel mapping never divides by zero.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 0.5, max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

fn tick_label(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if magnitude >= 10000.0 || magnitude < 0.01 {
        format!("{value:.2e}")
    } else if magnitude >= 10.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.3}")
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
