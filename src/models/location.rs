// src/models/location.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// One timestamped position sample from a driver's device.
///
/// The same shape serves both views of driver position: the current-fix map
/// (overwritten on every newer sample) and the append-only history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocationFix {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
}

impl LocationFix {
    /// Basic range validation; fixes outside these bounds are logged and
    /// discarded by the store, never surfaced as a caller error.
    pub fn in_bounds(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}
