//! crates/weight_tracker_core/src/trend.rs
//!
//! Merges both users' actual and predicted series into one chart specification.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::warn;

use crate::domain::WeightRecord;
use crate::forecast::{forecast, ForecastPoint};

/// One fixed color per user slot.
const USER_COLORS: [&str; 2] = ["blue", "red"];

const ACTUAL_HOVER: &str = "Date: %{x}<br>Weight: %{y:.1f}kg<br>";
const FORECAST_HOVER: &str = "Forecast date: %{x}<br>Forecast weight: %{y:.1f}kg<br>";

//=========================================================================================
// Chart Specification
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Actual,
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashStyle {
    Solid,
    Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotMode {
    LinesMarkers,
    Lines,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStyle {
    pub color: &'static str,
    pub dash: DashStyle,
    pub mode: PlotMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub identity: String,
    pub kind: SeriesKind,
    pub style: SeriesStyle,
    pub hover_template: &'static str,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: &'static str,
    pub x_axis_title: &'static str,
    pub y_axis_title: &'static str,
    pub hover_mode: &'static str,
    pub show_legend: bool,
    pub series: Vec<ChartSeries>,
}

//=========================================================================================
// Request
//=========================================================================================

/// The inclusive range of timestamps shown on the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl DisplayWindow {
    pub fn contains(&self, at: DateTime<FixedOffset>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Records inside the window, oldest first.
    pub fn filter<'a>(&self, records: &'a [WeightRecord]) -> Vec<&'a WeightRecord> {
        let mut visible: Vec<&WeightRecord> = records
            .iter()
            .filter(|r| self.contains(r.timestamp))
            .collect();
        visible.sort_by_key(|r| r.timestamp);
        visible
    }
}

/// One user's full, unfiltered history.
#[derive(Debug, Clone, Copy)]
pub struct UserHistory<'a> {
    pub identity: &'a str,
    pub records: &'a [WeightRecord],
}

#[derive(Debug, Clone, Copy)]
pub struct TrendRequest<'a> {
    pub users: [UserHistory<'a>; 2],
    pub window: DisplayWindow,
    pub show_forecast: bool,
    pub now: DateTime<FixedOffset>,
    pub horizon: u32,
}

//=========================================================================================
// Rendering
//=========================================================================================

/// Builds the chart for both users.
///
/// Never fails: a user without visible records simply contributes no actual
/// series, and a forecast that cannot be computed is left out.
pub fn render_trend(request: &TrendRequest<'_>) -> ChartSpec {
    let mut series = Vec::new();

    for (user, color) in request.users.iter().zip(USER_COLORS) {
        let visible = request.window.filter(user.records);

        if !visible.is_empty() {
            series.push(ChartSeries {
                label: user.identity.to_string(),
                identity: user.identity.to_string(),
                kind: SeriesKind::Actual,
                style: SeriesStyle {
                    color,
                    dash: DashStyle::Solid,
                    mode: PlotMode::LinesMarkers,
                },
                hover_template: ACTUAL_HOVER,
                points: visible
                    .iter()
                    .map(|r| ChartPoint {
                        timestamp: r.timestamp,
                        value: r.weight,
                    })
                    .collect(),
            });
        }

        if !request.show_forecast {
            continue;
        }

        let predicted = match forecast(user.records, request.now, request.horizon) {
            Ok(points) => points,
            Err(e) => {
                warn!(identity = user.identity, "Forecast unavailable: {}", e);
                continue;
            }
        };
        if predicted.is_empty() {
            continue;
        }

        series.push(forecast_series(user.identity, color, visible.last().copied(), predicted));
    }

    ChartSpec {
        title: "Weight trend",
        x_axis_title: "Date",
        y_axis_title: "Weight (kg)",
        hover_mode: "x unified",
        show_legend: true,
        series,
    }
}

/// Builds a forecast line, stitched to the last visible actual point when there is one.
fn forecast_series(
    identity: &str,
    color: &'static str,
    anchor: Option<&WeightRecord>,
    predicted: Vec<ForecastPoint>,
) -> ChartSeries {
    let mut points = Vec::with_capacity(predicted.len() + 1);
    if let Some(anchor) = anchor {
        points.push(ChartPoint {
            timestamp: anchor.timestamp,
            value: anchor.weight,
        });
    }
    points.extend(predicted.into_iter().map(|p| ChartPoint {
        timestamp: p.timestamp,
        value: p.weight,
    }));

    ChartSeries {
        label: format!("{identity} (forecast)"),
        identity: identity.to_string(),
        kind: SeriesKind::Forecast,
        style: SeriesStyle {
            color,
            dash: DashStyle::Dash,
            mode: PlotMode::Lines,
        },
        hover_template: FORECAST_HOVER,
        points,
    }
}
