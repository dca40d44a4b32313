// src/models/packet.rs
use serde::{Deserialize, Serialize};

use crate::models::location::LocationFix;
use crate::models::notification::TripNotification;
use crate::models::trip::{Fare, TripState};

/// Which side of a trip a session speaks for. A session binds to exactly
/// one (trip, role) pair; at most one live session per role per trip.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Driver,
    Rider,
}

impl SessionRole {
    pub fn peer(&self) -> SessionRole {
        match self {
            SessionRole::Driver => SessionRole::Rider,
            SessionRole::Rider => SessionRole::Driver,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Driver => "driver",
            SessionRole::Rider => "rider",
        }
    }
}

/// Tagged payload of one trip packet. Every kind a session may carry is
/// enumerated here; the relay matches exhaustively and maps the lifecycle
/// kinds onto state-machine events.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PacketPayload {
    LocationPing { fix: LocationFix },
    StatusChange { state: TripState },
    Arrived,
    TripStarted,
    TripEnded { fare: Fare },
    PaymentConfirmed,
    Message { text: String },
}

/// One discrete message exchanged over a bound session. Transient: relayed,
/// possibly applied to the trip, then discarded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripPacket {
    pub trip_id: String,
    /// Monotonically increasing per connection; stale packets are dropped.
    pub seq: u64,
    pub payload: PacketPayload,
}

/// Driver-side packet. Same wire shape as the rider's; the role comes from
/// the endpoint the session connected on.
pub type DriverTripPacket = TripPacket;
/// Rider-side packet.
pub type UserTripPacket = TripPacket;

/// Frames a client sends on a trip session.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame on the connection. `party_id` is the driver
    /// id or rider id claiming the trip.
    Bind { trip_id: String, party_id: String },
    Packet { packet: TripPacket },
}

/// Frames the server sends back on a trip session.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Bound {
        trip_id: String,
        session_id: String,
        state: TripState,
    },
    /// A peer packet forwarded verbatim.
    Packet { packet: TripPacket },
    Notification { notification: TripNotification },
    Error { code: String, message: String },
}
