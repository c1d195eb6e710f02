/// Chart output: plotly-shaped JSON for the front end's chart widget.
///
/// A `ChartSpec` serializes to `{"data": [...], "layout": {...}}`, one
/// scatter trace per series. Return period overlays add four stacked
/// horizontal bands and right-edge threshold annotations to the layout.

use serde::Serialize;

use crate::model::{DisplayUnit, LocationKey, ReturnPeriodThresholds, TimeSeries, Timestamp};

/// Timestamp layout used for chart axes and CSV rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const YELLOW_BAND: &str = "rgba(255, 255, 0, 0.4)";
const RED_BAND: &str = "rgba(255, 0, 0, 0.4)";
const PURPLE_BAND: &str = "rgba(128, 0, 128, 0.4)";
const ABOVE_MAX_BAND: &str = "rgba(64, 0, 64, 0.4)";

// ---------------------------------------------------------------------------
// Chart structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub x: Vec<String>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: String,
    pub xaxis: Axis,
    pub yaxis: Axis,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<Shape>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStyle {
    pub width: u32,
}

/// A filled rectangle spanning the plotted time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shape {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub xref: &'static str,
    pub yref: &'static str,
    pub x0: String,
    pub x1: String,
    pub y0: f64,
    pub y1: f64,
    pub line: LineStyle,
    pub fillcolor: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub x: String,
    pub y: f64,
    pub xref: &'static str,
    pub yref: &'static str,
    pub text: String,
    pub showarrow: bool,
    pub xanchor: &'static str,
}

/// Bands and annotations for one reach's return periods.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnPeriodOverlay {
    pub shapes: Vec<Shape>,
    pub annotations: Vec<Annotation>,
}

/// Title and axis labels for a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLabels {
    pub title: String,
    pub variable: String,
    pub unit: DisplayUnit,
}

impl ChartLabels {
    /// `"{heading}<br><sub>{watershed} ({subbasin}): {reach}</sub>"`
    pub fn for_location(heading: &str, location: &LocationKey, unit: DisplayUnit) -> Self {
        ChartLabels {
            title: format!(
                "{}<br><sub>{} ({}): {}</sub>",
                heading, location.watershed, location.subbasin, location.reach_id
            ),
            variable: "Streamflow".to_string(),
            unit,
        }
    }

    fn y_axis_title(&self) -> String {
        format!("{} ({}<sup>3</sup>/s)", self.variable, self.unit.length_label())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Builds a chart with one line trace per series, plus the overlay if given.
pub fn to_chart_spec(
    series: &[TimeSeries],
    labels: &ChartLabels,
    overlay: Option<ReturnPeriodOverlay>,
) -> ChartSpec {
    let data = series
        .iter()
        .map(|s| Trace {
            name: s.name.clone(),
            kind: "scatter",
            mode: "lines",
            x: s.points.iter().map(|p| p.timestamp.format(TIMESTAMP_FORMAT).to_string()).collect(),
            y: s.values(),
        })
        .collect();

    let overlay = overlay.unwrap_or_default();

    ChartSpec {
        data,
        layout: Layout {
            title: labels.title.clone(),
            xaxis: Axis { title: "Date".to_string() },
            yaxis: Axis { title: labels.y_axis_title() },
            shapes: overlay.shapes,
            annotations: overlay.annotations,
        },
    }
}

/// Time window and top of data covered by a set of series, for sizing the
/// overlay. `None` when every series is empty.
pub fn plotted_window(series: &[TimeSeries]) -> Option<(Timestamp, Timestamp, f64)> {
    let start = series.iter().filter_map(|s| s.first_timestamp()).min()?;
    let end = series.iter().filter_map(|s| s.last_timestamp()).max()?;
    let top = series
        .iter()
        .filter_map(|s| s.max_value())
        .fold(f64::NEG_INFINITY, f64::max);
    Some((start, end, top))
}

/// Builds the return period bands for a time window.
///
/// Thresholds are sorted before being assigned to tiers, so the bands are
/// always stacked bottom to top as 2-yr, 10-yr, 20-yr, above-max even when
/// the source values are out of order. The above-max band reaches up to
/// `max(threshold max, data_top)`.
pub fn return_period_overlay(
    thresholds: &ReturnPeriodThresholds,
    window_start: Timestamp,
    window_end: Timestamp,
    data_top: f64,
) -> ReturnPeriodOverlay {
    let mut levels = [thresholds.two, thresholds.ten, thresholds.twenty, thresholds.max];
    levels.sort_by(f64::total_cmp);
    let [two, ten, twenty, max] = levels;

    let x0 = window_start.format(TIMESTAMP_FORMAT).to_string();
    let x1 = window_end.format(TIMESTAMP_FORMAT).to_string();
    let band = |y0: f64, y1: f64, fillcolor: &'static str| Shape {
        kind: "rect",
        xref: "x",
        yref: "y",
        x0: x0.clone(),
        x1: x1.clone(),
        y0,
        y1,
        line: LineStyle { width: 0 },
        fillcolor,
    };

    let shapes = vec![
        band(two, ten, YELLOW_BAND),
        band(ten, twenty, RED_BAND),
        band(twenty, max, PURPLE_BAND),
        band(max, max.max(data_top), ABOVE_MAX_BAND),
    ];

    let label = |y: f64, name: &str| Annotation {
        x: x1.clone(),
        y,
        xref: "x",
        yref: "y",
        text: format!("{} ({:.1})", name, y),
        showarrow: false,
        xanchor: "left",
    };

    let annotations = vec![
        label(two, "2-yr"),
        label(ten, "10-yr"),
        label(twenty, "20-yr"),
        label(max, "Max."),
    ];

    ReturnPeriodOverlay { shapes, annotations }
}
