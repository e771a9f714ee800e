//! crates/weight_tracker_core/src/domain.rs
//!
//! Defines the core data structures for the application: a single weight
//! observation, its meal-timing annotation, and the flat document shape the
//! record store persists.

use chrono::{DateTime, FixedOffset, SecondsFormat, SubsecRound};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Meal Timing
//=========================================================================================

/// Accepted "time since last meal" values (hours) and their display labels.
pub const TIME_AFTER_MEAL_OPTIONS: [(f64, &str); 7] = [
    (0.5, "30 min"),
    (1.0, "1 h"),
    (1.5, "1 h 30 min"),
    (2.0, "2 h"),
    (2.5, "2 h 30 min"),
    (3.0, "3 h"),
    (3.5, "3 h 30 min or more"),
];

/// Label returned for values outside [`TIME_AFTER_MEAL_OPTIONS`].
pub const UNKNOWN_MEAL_LABEL: &str = "unknown";

/// Upper bound of the weight input form, in kilograms.
pub const MAX_INPUT_WEIGHT_KG: f64 = 100.0;

/// Converts a meal interval into its display label.
///
/// Never fails: values that are not one of the accepted options map to
/// [`UNKNOWN_MEAL_LABEL`].
pub fn meal_interval_label(value: f64) -> &'static str {
    TIME_AFTER_MEAL_OPTIONS
        .iter()
        .find(|(hours, _)| *hours == value)
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN_MEAL_LABEL)
}

fn is_known_meal_interval(value: f64) -> bool {
    TIME_AFTER_MEAL_OPTIONS.iter().any(|(hours, _)| *hours == value)
}

//=========================================================================================
// Errors
//=========================================================================================

/// Validation failures for a single weight record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Weight must be a positive number of kilograms, got {0}")]
    NonPositiveWeight(f64),
    #[error("Weight must not exceed 100 kg, got {0}")]
    WeightOutOfRange(f64),
    #[error("Unsupported time after meal: {0} h")]
    UnknownMealInterval(f64),
    #[error("Malformed timestamp '{0}'")]
    MalformedTimestamp(String),
}

//=========================================================================================
// WeightRecord
//=========================================================================================

/// One timestamped weight observation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecord {
    /// Assigned by the record store; `None` until persisted.
    pub id: Option<String>,
    pub weight: f64,
    pub timestamp: DateTime<FixedOffset>,
    pub time_after_meal: f64,
    pub edited: bool,
}

impl WeightRecord {
    /// Builds a new, unpersisted and unedited record.
    ///
    /// The timestamp is truncated to whole seconds, matching what the store
    /// keeps.
    pub fn new(
        weight: f64,
        timestamp: DateTime<FixedOffset>,
        time_after_meal: f64,
    ) -> Result<Self, RecordError> {
        let record = Self {
            id: None,
            weight,
            timestamp: timestamp.trunc_subsecs(0),
            time_after_meal,
            edited: false,
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks the record invariants.
    pub fn validate(&self) -> Result<(), RecordError> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(RecordError::NonPositiveWeight(self.weight));
        }
        if !is_known_meal_interval(self.time_after_meal) {
            return Err(RecordError::UnknownMealInterval(self.time_after_meal));
        }
        Ok(())
    }

    /// Applies the bounds of the input form on top of [`Self::validate`].
    pub fn validate_input(&self) -> Result<(), RecordError> {
        self.validate()?;
        if self.weight > MAX_INPUT_WEIGHT_KG {
            return Err(RecordError::WeightOutOfRange(self.weight));
        }
        Ok(())
    }

    /// The display label of this record's meal interval.
    pub fn meal_label(&self) -> &'static str {
        meal_interval_label(self.time_after_meal)
    }

    /// Converts the record into its persisted document form.
    pub fn to_document(&self) -> RecordDocument {
        RecordDocument {
            weight: self.weight,
            timestamp: self
                .timestamp
                .trunc_subsecs(0)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            time_after_meal: self.time_after_meal,
            edited: self.edited,
        }
    }

    /// Rebuilds a record from a stored document and the id it is stored under.
    ///
    /// Documents written outside this crate are held to the same invariants
    /// as new records.
    pub fn from_document(id: Option<String>, document: RecordDocument) -> Result<Self, RecordError> {
        let timestamp = DateTime::parse_from_rfc3339(&document.timestamp)
            .map_err(|_| RecordError::MalformedTimestamp(document.timestamp.clone()))?;
        let record = Self {
            id,
            weight: document.weight,
            timestamp: timestamp.trunc_subsecs(0),
            time_after_meal: document.time_after_meal,
            edited: document.edited,
        };
        record.validate()?;
        Ok(record)
    }
}

/// The flat mapping a record is stored as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    pub weight: f64,
    /// ISO-8601 with offset, second precision.
    pub timestamp: String,
    pub time_after_meal: f64,
    #[serde(default)]
    pub edited: bool,
}

//=========================================================================================
// Identity Directory
//=========================================================================================

/// A registered login identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityEntry {
    pub password_hash: String,
    pub salt: String,
    pub registered_at: DateTime<FixedOffset>,
}
