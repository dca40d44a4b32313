// src/models/notification.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::trip::{CancelReason, Trip};

/// Structured notification synthesized on Arrived, EndTrip and Cancel
/// transitions and delivered to the rider's bound session. Delivery is
/// best-effort once the reconnection grace window lapses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripNotification {
    pub id: String,
    pub trip_id: String,
    pub icon: String,
    pub title: String,
    pub message: String,
    pub fare: Option<String>,
    pub currency: Option<String>,
}

impl TripNotification {
    fn new(trip_id: &str, icon: &str, title: &str, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.to_string(),
            icon: icon.to_string(),
            title: title.to_string(),
            message,
            fare: None,
            currency: None,
        }
    }

    pub fn driver_arrived(trip: &Trip) -> Self {
        let place = trip
            .pickup()
            .map(|stop| stop.address.clone())
            .unwrap_or_else(|| "the pickup point".to_string());
        Self::new(
            &trip.id,
            "📍",
            "Driver Arrived",
            format!("Your driver is waiting at {}", place),
        )
    }

    pub fn trip_ended(trip: &Trip) -> Self {
        let mut notification = Self::new(
            &trip.id,
            "✅",
            "Trip Completed",
            "Thanks for riding with us!".to_string(),
        );
        if let Some(fare) = &trip.fare {
            notification.message = format!(
                "Thanks for riding with us! Total fare: {:.2} {}",
                fare.amount, fare.currency
            );
            notification.fare = Some(format!("{:.2}", fare.amount));
            notification.currency = Some(fare.currency.clone());
        }
        notification
    }

    pub fn trip_cancelled(trip: &Trip) -> Self {
        let message = match &trip.cancel_reason {
            Some(CancelReason::PeerLost) => {
                "Your trip was cancelled because the driver connection was lost".to_string()
            }
            Some(CancelReason::DriverRequest) => {
                "Your trip was cancelled by the driver".to_string()
            }
            Some(CancelReason::RiderRequest) => "Your trip was cancelled".to_string(),
            Some(CancelReason::Other(reason)) => {
                format!("Your trip was cancelled: {}", reason)
            }
            None => "Your trip was cancelled".to_string(),
        };
        Self::new(&trip.id, "❌", "Trip Cancelled", message)
    }
}
