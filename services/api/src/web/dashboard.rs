//! services/api/src/web/dashboard.rs
//!
//! The main page: both users' trend chart for the selected window, the
//! caller's editable records, and the meal-interval options for the input form.
//! Store failures degrade to an empty history plus a notice, so the page
//! always renders.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use weight_tracker_core::domain::{WeightRecord, TIME_AFTER_MEAL_OPTIONS};
use weight_tracker_core::trend::{render_trend, ChartSpec, DisplayWindow, TrendRequest, UserHistory};

use crate::error::Rejection;
use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;

/// Days shown when no start date is given.
const DEFAULT_WINDOW_DAYS: i64 = 7;

//=========================================================================================
// Query and Response Types
//=========================================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub forecast: bool,
}

#[derive(Serialize, ToSchema)]
pub struct RecordView {
    pub id: Option<String>,
    pub weight: f64,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: String,
    pub time_after_meal: f64,
    pub meal_label: String,
    pub edited: bool,
}

impl RecordView {
    pub fn from_record(record: &WeightRecord) -> Self {
        Self {
            id: record.id.clone(),
            weight: record.weight,
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            time_after_meal: record.time_after_meal,
            meal_label: record.meal_label().to_string(),
            edited: record.edited,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MealIntervalOption {
    pub hours: f64,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub identity: String,
    #[schema(value_type = String, format = DateTime)]
    pub window_start: String,
    #[schema(value_type = String, format = DateTime)]
    pub window_end: String,
    pub show_forecast: bool,
    /// Series for both users; see the chart boundary description.
    #[schema(value_type = Object)]
    pub chart: ChartSpec,
    /// The caller's records inside the window, oldest first.
    pub records: Vec<RecordView>,
    pub meal_intervals: Vec<MealIntervalOption>,
    /// User-facing messages for anything that failed while building the page.
    pub notices: Vec<String>,
}

//=========================================================================================
// Window Resolution
//=========================================================================================

fn day_bound(
    date: NaiveDate,
    time: NaiveTime,
    offset: &FixedOffset,
) -> Result<DateTime<FixedOffset>, Rejection> {
    date.and_time(time)
        .and_local_timezone(*offset)
        .single()
        .ok_or((StatusCode::BAD_REQUEST, format!("Invalid date {}", date)))
}

/// Expands the selected dates to `[start 00:00:00, end 23:59:59]` in the reference timezone.
///
/// `end` defaults to today and `start` to a week before `end`.
pub fn resolve_window(query: &WindowQuery, now: DateTime<FixedOffset>) -> Result<DisplayWindow, Rejection> {
    let offset = now.offset();
    let end_date = query.end.unwrap_or_else(|| now.date_naive());
    let start_date = query
        .start
        .unwrap_or_else(|| end_date - Duration::days(DEFAULT_WINDOW_DAYS));
    if end_date < start_date {
        return Err((
            StatusCode::BAD_REQUEST,
            "The end date must not be before the start date".to_string(),
        ));
    }

    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
    Ok(DisplayWindow {
        start: day_bound(start_date, NaiveTime::default(), offset)?,
        end: day_bound(end_date, last_second, offset)?,
    })
}

//=========================================================================================
// Handler
//=========================================================================================

/// Render the dashboard for the logged-in identity.
#[utoipa::path(
    get,
    path = "/dashboard",
    params(
        ("start" = Option<String>, Query, description = "First day shown (YYYY-MM-DD); defaults to a week before `end`."),
        ("end" = Option<String>, Query, description = "Last day shown (YYYY-MM-DD); defaults to today."),
        ("forecast" = Option<bool>, Query, description = "Show the forecast lines.")
    ),
    responses(
        (status = 200, description = "Chart and editable records", body = DashboardResponse),
        (status = 400, description = "Invalid window"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let now = state.now();
    let window = resolve_window(&query, now)?;
    let [first, second] = &state.config.identities;
    let mut notices = Vec::new();

    // 1. Load the full history of both users
    let mut histories = Vec::with_capacity(2);
    for user in [first, second] {
        let records = match state.records.read_all(user).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load records for {}: {:?}", user, e);
                notices.push(format!("Could not load records for {}", user));
                Vec::new()
            }
        };
        histories.push(records);
    }

    // 2. Build the chart from the full histories
    let chart = render_trend(&TrendRequest {
        users: [
            UserHistory {
                identity: first,
                records: &histories[0],
            },
            UserHistory {
                identity: second,
                records: &histories[1],
            },
        ],
        window,
        show_forecast: query.forecast,
        now,
        horizon: state.config.forecast_horizon_days,
    });

    // 3. Only the caller's own records are editable
    let own = if identity == *first { &histories[0] } else { &histories[1] };
    let records = window
        .filter(own)
        .into_iter()
        .map(RecordView::from_record)
        .collect();

    let meal_intervals = TIME_AFTER_MEAL_OPTIONS
        .iter()
        .map(|(hours, label)| MealIntervalOption {
            hours: *hours,
            label: label.to_string(),
        })
        .collect();

    Ok(Json(DashboardResponse {
        identity,
        window_start: window.start.to_rfc3339_opts(SecondsFormat::Secs, false),
        window_end: window.end.to_rfc3339_opts(SecondsFormat::Secs, false),
        show_forecast: query.forecast,
        chart,
        records,
        meal_intervals,
        notices,
    }))
}
