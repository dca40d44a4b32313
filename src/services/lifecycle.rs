// src/services/lifecycle.rs
//
// Trip lifecycle state machine. Pure: every transition attempt is a
// function of (current state, event) and performs no I/O. The registry is
// responsible for persisting accepted transitions and the relay for
// notifying the non-originating peer.
use chrono::{DateTime, Utc};

use crate::errors::RideLinkError;
use crate::models::trip::{CancelReason, Fare, Trip, TripState};

/// One lifecycle event. Accepted/EnRoute are distinct states: `Accept`
/// only commits the driver, `Depart` signals the drive to pickup.
#[derive(Debug, Clone, PartialEq)]
pub enum TripEvent {
    Accept { driver_id: String },
    Depart,
    MarkArrived,
    StartTrip,
    EndTrip { fare: Fare },
    Cancel { reason: CancelReason },
}

impl TripEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TripEvent::Accept { .. } => "Accept",
            TripEvent::Depart => "Depart",
            TripEvent::MarkArrived => "MarkArrived",
            TripEvent::StartTrip => "StartTrip",
            TripEvent::EndTrip { .. } => "EndTrip",
            TripEvent::Cancel { .. } => "Cancel",
        }
    }
}

/// Compute the successor state, or InvalidTransition with the trip left
/// untouched by the caller.
pub fn transition(current: TripState, event: &TripEvent) -> Result<TripState, RideLinkError> {
    let next = match (current, event) {
        (TripState::Requested, TripEvent::Accept { .. }) => TripState::Accepted,
        (TripState::Accepted, TripEvent::Depart) => TripState::EnRoute,
        (TripState::Accepted, TripEvent::MarkArrived) => TripState::Arrived,
        (TripState::EnRoute, TripEvent::MarkArrived) => TripState::Arrived,
        (TripState::Arrived, TripEvent::StartTrip) => TripState::InProgress,
        (TripState::InProgress, TripEvent::EndTrip { .. }) => TripState::Ended,
        (state, TripEvent::Cancel { .. }) if !state.is_terminal() => TripState::Cancelled,
        (state, event) => {
            return Err(RideLinkError::invalid_transition(state, event.name()));
        }
    };
    Ok(next)
}

/// Validate the event against the trip's current state and, on success,
/// record its effects (new state, driver assignment, fare, reason,
/// timestamps). `now` is supplied by the caller so replays stay
/// deterministic.
pub fn apply_event(
    trip: &mut Trip,
    event: &TripEvent,
    now: DateTime<Utc>,
) -> Result<(), RideLinkError> {
    let next = transition(trip.state, event)?;

    match event {
        TripEvent::Accept { driver_id } => {
            trip.driver_id = Some(driver_id.clone());
            trip.accepted_at = Some(now);
        }
        TripEvent::Depart => {}
        TripEvent::MarkArrived => {
            trip.arrived_at = Some(now);
        }
        TripEvent::StartTrip => {
            trip.started_at = Some(now);
        }
        TripEvent::EndTrip { fare } => {
            trip.fare = Some(fare.clone());
            trip.ended_at = Some(now);
        }
        TripEvent::Cancel { reason } => {
            trip.cancel_reason = Some(reason.clone());
            trip.cancelled_at = Some(now);
        }
    }

    trip.state = next;
    trip.updated_at = now;
    Ok(())
}
