// src/models/driver.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::models::location::LocationFix;

/// Derived presence/occupancy state. Never stored on the driver record:
/// OnTrip is resolved against the trip registry, the rest follow the
/// driver's own connection lifecycle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unspecified,
    Available,  // Connected and idle
    OnTrip,     // Registry holds a non-terminal trip for this driver
    Inactive,   // Connected but suspended
    Offline,    // Disconnected
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Driver {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub vehicle_plate: String,
    pub rating: f32,
    pub total_trips: u32,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct DriverRegistration {
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub vehicle_plate: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DriverUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile_number: Option<String>,
    pub vehicle_plate: Option<String>,
    pub suspended: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub vehicle_plate: String,
    pub state: DriverState,
    pub rating: f32,
    pub total_trips: u32,
    pub current_location: Option<LocationFix>,
}
