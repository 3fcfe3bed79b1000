//! SVG training curves
//!
//! Renders the per-epoch loss and accuracy series of a training run as two
//! standalone SVG line charts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::training::history::TrainingHistory;
use crate::utils::error::Result;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_TRAIN: &str = "#3498db";
const COLOR_VALIDATION: &str = "#e67e22";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

#[derive(Debug, Clone)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

/// Y-axis scaling for a line chart
#[derive(Debug, Clone, Copy)]
pub enum YAxis {
    /// Fraction in `[0, 1]`, labelled as a percentage
    Fraction,
    /// From zero to the largest observed value
    FromZero,
}

/// Paths of the rendered training curves
#[derive(Debug, Clone)]
pub struct TrainingCurves {
    pub loss: PathBuf,
    pub accuracy: PathBuf,
}

/// Write `loss.svg` and `accuracy.svg` for a training run into `dir`.
pub fn render_training_curves(history: &TrainingHistory, dir: &Path) -> Result<TrainingCurves> {
    fs::create_dir_all(dir)?;

    let loss = dir.join("loss.svg");
    let loss_series = vec![
        series("train", COLOR_TRAIN, history.records.iter().map(|r| (r.epoch, Some(r.train_loss)))),
        series("validation", COLOR_VALIDATION, history.records.iter().map(|r| (r.epoch, r.val_loss))),
    ];
    generate_line_chart("Model loss", "Epoch", "Loss", &loss_series, YAxis::FromZero, &loss)?;

    let accuracy = dir.join("accuracy.svg");
    let accuracy_series = vec![
        series("train", COLOR_TRAIN, history.records.iter().map(|r| (r.epoch, Some(r.train_accuracy)))),
        series("validation", COLOR_VALIDATION, history.records.iter().map(|r| (r.epoch, r.val_accuracy))),
    ];
    generate_line_chart("Model accuracy", "Epoch", "Accuracy", &accuracy_series, YAxis::Fraction, &accuracy)?;

    tracing::info!("Training curves written to {}", dir.display());
    Ok(TrainingCurves { loss, accuracy })
}

fn series(name: &str, color: &str, values: impl Iterator<Item = (usize, Option<f64>)>) -> DataSeries {
    DataSeries {
        name: name.to_string(),
        points: values
            .filter_map(|(epoch, value)| value.map(|y| DataPoint { x: epoch as f64, y }))
            .filter(|p| p.y.is_finite())
            .collect(),
        color: color.to_string(),
    }
}

/// Render a line chart to an SVG file
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    y_axis: YAxis,
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, _, observed_y_max) = find_ranges(series);
    let y_min = 0.0;
    let y_max = match y_axis {
        YAxis::Fraction => 1.0_f64.max(observed_y_max),
        YAxis::FromZero if observed_y_max > 0.0 => observed_y_max * 1.1,
        YAxis::FromZero => 1.0,
    };
    // A single epoch still needs a non-zero span
    let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };

    let to_x = |x: f64| MARGIN_LEFT + ((x - x_min) / x_span) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / (y_max - y_min)) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines and y tick labels
    for i in 0..=5 {
        let fraction = i as f64 / 5.0;
        let y = MARGIN_TOP + plot_height - fraction * plot_height;
        let value = y_min + fraction * (y_max - y_min);

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));

        let tick = match y_axis {
            YAxis::Fraction => format!("{:.0}%", value * 100.0),
            YAxis::FromZero => format!("{:.2}", value),
        };
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, tick
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    for series_data in series.iter().filter(|s| !s.points.is_empty()) {
        let path: Vec<String> = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} {} {}", if i == 0 { "M" } else { "L" }, to_x(p.x), to_y(p.y)))
            .collect();

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path.join(" "), series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                to_x(point.x), to_y(point.y), series_data.color
            ));
        }
    }

    // X tick labels from the first non-empty series
    if let Some(first) = series.iter().find(|s| !s.points.is_empty()) {
        for point in &first.points {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                to_x(point.x), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 110.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 90.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");

    fs::write(output_path, svg)
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for p in series.iter().flat_map(|s| s.points.iter()) {
        x_min = x_min.min(p.x);
        x_max = x_max.max(p.x);
        y_min = y_min.min(p.y);
        y_max = y_max.max(p.y);
    }

    if x_min > x_max {
        return (0.0, 1.0, 0.0, 0.0);
    }
    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
