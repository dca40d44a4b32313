// src/services/matching.rs
use crate::models::driver::DriverState;
use crate::models::location::LocationFix;
use crate::models::trip::Trip;

/// One candidate for assignment: driver id, last known fix, derived state.
#[derive(Debug, Clone)]
pub struct AssignmentCandidate {
    pub driver_id: String,
    pub fix: LocationFix,
    pub state: DriverState,
}

/// Pluggable assignment decision. The core treats Accept as
/// driver-initiated; a policy only *proposes* a driver for a requested
/// trip (surfaced as a dispatch aid), it never mutates trip state.
pub trait AssignmentPolicy: Send + Sync {
    /// Propose a driver for the trip, or None when no candidate qualifies.
    fn propose(&self, trip: &Trip, candidates: &[AssignmentCandidate]) -> Option<String>;
}

/// Default policy: the available driver closest to the pickup stop by
/// straight-line distance.
pub struct NearestAvailable;

impl AssignmentPolicy for NearestAvailable {
    fn propose(&self, trip: &Trip, candidates: &[AssignmentCandidate]) -> Option<String> {
        let pickup = trip.pickup()?;
        candidates
            .iter()
            .filter(|candidate| candidate.state == DriverState::Available)
            .min_by(|a, b| {
                let da = haversine_km(pickup.latitude, pickup.longitude, a.fix.latitude, a.fix.longitude);
                let db = haversine_km(pickup.latitude, pickup.longitude, b.fix.latitude, b.fix.longitude);
                da.total_cmp(&db)
            })
            .map(|candidate| candidate.driver_id.clone())
    }
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let earth_radius_km = 6371.0;
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    earth_radius_km * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{Stop, TripState};
    use chrono::Utc;

    fn candidate(driver_id: &str, lat: f64, state: DriverState) -> AssignmentCandidate {
        AssignmentCandidate {
            driver_id: driver_id.to_string(),
            fix: LocationFix {
                driver_id: driver_id.to_string(),
                latitude: lat,
                longitude: 0.0,
                recorded_at: Utc::now(),
                bearing: None,
                speed: None,
            },
            state,
        }
    }

    fn requested_trip() -> Trip {
        let now = Utc::now();
        Trip {
            id: "trp-1".to_string(),
            rider_id: "rid-1".to_string(),
            driver_id: None,
            state: TripState::Requested,
            stops: vec![
                Stop { latitude: 0.0, longitude: 0.0, address: "Pickup".to_string() },
                Stop { latitude: 5.0, longitude: 5.0, address: "Dropoff".to_string() },
            ],
            requested_at: now,
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            fare: None,
            rating: None,
            cancel_reason: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_nearest_available_wins() {
        let trip = requested_trip();
        let candidates = vec![
            candidate("drv-far", 3.0, DriverState::Available),
            candidate("drv-near", 0.1, DriverState::Available),
            candidate("drv-nearest-but-busy", 0.01, DriverState::OnTrip),
        ];

        let proposed = NearestAvailable.propose(&trip, &candidates);
        assert_eq!(proposed.as_deref(), Some("drv-near"));
    }

    #[test]
    fn test_no_available_candidates() {
        let trip = requested_trip();
        let candidates = vec![candidate("drv-1", 0.1, DriverState::Offline)];
        assert!(NearestAvailable.propose(&trip, &candidates).is_none());
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111 km.
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.5, "got {}", d);
    }
}
