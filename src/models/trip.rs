// src/models/trip.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripState {
    Requested,   // Rider asked for a ride, no driver yet
    Accepted,    // Driver committed, not yet moving
    EnRoute,     // Driver heading to pickup
    Arrived,     // Driver at pickup
    InProgress,  // Rider on board
    Ended,       // Completed, fare recorded
    Cancelled,   // Aborted from any non-terminal state
}

impl TripState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripState::Ended | TripState::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum CancelReason {
    RiderRequest,
    DriverRequest,
    PeerLost,
    Other(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stop {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fare {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Trip {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub state: TripState,

    // Pickup first, dropoff last; intermediate stops in between.
    pub stops: Vec<Stop>,

    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub fare: Option<Fare>,
    pub rating: Option<u8>,
    pub cancel_reason: Option<CancelReason>,

    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn pickup(&self) -> Option<&Stop> {
        self.stops.first()
    }

    pub fn dropoff(&self) -> Option<&Stop> {
        self.stops.last()
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTripRequest {
    pub rider_id: String,
    pub stops: Vec<Stop>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TripResponse {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub state: TripState,
    pub stops: Vec<Stop>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub fare: Option<Fare>,
    pub rating: Option<u8>,
    pub cancel_reason: Option<CancelReason>,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        TripResponse {
            id: trip.id,
            rider_id: trip.rider_id,
            driver_id: trip.driver_id,
            state: trip.state,
            stops: trip.stops,
            requested_at: trip.requested_at,
            accepted_at: trip.accepted_at,
            started_at: trip.started_at,
            ended_at: trip.ended_at,
            fare: trip.fare,
            rating: trip.rating,
            cancel_reason: trip.cancel_reason,
        }
    }
}

// Search and Filter Models
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct TripFilter {
    pub rider_id: Option<String>,
    pub driver_id: Option<String>,
    pub state: Option<TripState>,
    pub active_only: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { offset: 0, limit: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}
