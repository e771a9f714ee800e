//! crates/weight_tracker_core/src/forecast.rs
//!
//! Turns one user's history into short-horizon weight predictions.
//!
//! The engine is a pure function of `(history, now, horizon)`: it builds one
//! feature vector per record, standardizes the matrix, fits a boosted tree
//! ensemble, and then extrapolates one calendar day at a time, feeding each
//! step's weight change into the next.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};
use serde::Serialize;

use crate::boosting::{BoostingParams, FitError, GradientBoostedTrees, StandardScaler};
use crate::domain::WeightRecord;

/// Fewer records than this produce an empty forecast.
pub const MIN_HISTORY_LEN: usize = 5;

pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// Meal interval assumed for every synthetic day.
const FORECAST_TIME_AFTER_MEAL: f64 = 2.0;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("Model fitting failed: {0}")]
    Fit(#[from] FitError),
    #[error("Prediction for day {0} is not a finite number")]
    NonFinitePrediction(u32),
}

/// One predicted point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub weight: f64,
}

/// Whole days from `now` to `at`, rounded towards negative infinity.
fn day_offset(now: DateTime<FixedOffset>, at: DateTime<FixedOffset>) -> i64 {
    (at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

fn feature_vector(
    offset_days: f64,
    time_after_meal: f64,
    at: DateTime<FixedOffset>,
    change_rate: f64,
) -> Vec<f64> {
    let hour = f64::from(at.hour());
    let angle = 2.0 * PI * hour / 24.0;
    vec![
        offset_days,
        time_after_meal,
        hour,
        f64::from(at.weekday().num_days_from_monday()),
        angle.sin(),
        angle.cos(),
        change_rate,
    ]
}

/// Builds the training matrix and targets from chronologically sorted records.
fn training_set(records: &[&WeightRecord], now: DateTime<FixedOffset>) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut features = Vec::with_capacity(records.len());
    let mut targets = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let change_rate = match i.checked_sub(1).and_then(|prev| records.get(prev)) {
            Some(prev) => {
                let gap = day_offset(prev.timestamp, record.timestamp);
                if gap > 0 {
                    (record.weight - prev.weight) / gap as f64
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        features.push(feature_vector(
            day_offset(now, record.timestamp) as f64,
            record.time_after_meal,
            record.timestamp,
            change_rate,
        ));
        targets.push(record.weight);
    }

    (features, targets)
}

/// Predicts one weight per day for `day = 1..=horizon` after `now`.
///
/// Histories shorter than [`MIN_HISTORY_LEN`] yield an empty forecast.
pub fn forecast(
    history: &[WeightRecord],
    now: DateTime<FixedOffset>,
    horizon: u32,
) -> Result<Vec<ForecastPoint>, ForecastError> {
    if history.len() < MIN_HISTORY_LEN || horizon == 0 {
        return Ok(Vec::new());
    }

    let mut records: Vec<&WeightRecord> = history.iter().collect();
    records.sort_by_key(|r| r.timestamp);

    let (features, targets) = training_set(&records, now);
    let scaler = StandardScaler::fit(&features)?;
    let model = GradientBoostedTrees::fit(
        &scaler.transform_all(&features),
        &targets,
        &BoostingParams::default(),
    )?;

    // Step 1 sees a zero rate; step 2 sees (first forecast - last actual).
    let mut previous = targets.last().copied().unwrap_or_default();
    let mut change_rate = 0.0;
    let mut points = Vec::with_capacity(horizon as usize);

    for day in 1..=horizon {
        let timestamp = now + Duration::days(i64::from(day));
        let features = feature_vector(
            f64::from(day),
            FORECAST_TIME_AFTER_MEAL,
            timestamp,
            change_rate,
        );
        let weight = model.predict(&scaler.transform(&features));
        if !weight.is_finite() {
            return Err(ForecastError::NonFinitePrediction(day));
        }

        change_rate = weight - previous;
        previous = weight;
        points.push(ForecastPoint { timestamp, weight });
    }

    Ok(points)
}
