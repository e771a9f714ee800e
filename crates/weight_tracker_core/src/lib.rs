pub mod boosting;
pub mod domain;
pub mod forecast;
pub mod guard;
pub mod ports;
pub mod trend;

pub use domain::{meal_interval_label, IdentityEntry, RecordDocument, RecordError, WeightRecord};
pub use forecast::{forecast, ForecastError, ForecastPoint};
pub use guard::{Admission, AttemptVerdict, LoginAttemptState, LoginGuard};
pub use ports::{IdentityDirectory, PortError, PortResult, RecordStore};
pub use trend::{render_trend, ChartSpec, DisplayWindow, TrendRequest, UserHistory};
