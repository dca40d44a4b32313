// src/services/relay.rs
//
// Joins the two independently-connecting halves of a trip. Each driver or
// rider session binds to exactly one (trip, role); packets are validated,
// applied to the trip where the payload implies a transition, then
// forwarded to the bound peer in arrival order. A disconnected peer gets a
// reconnection grace window before the trip is auto-cancelled as PeerLost.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing;

use crate::errors::RideLinkError;
use crate::models::notification::TripNotification;
use crate::models::packet::{PacketPayload, ServerFrame, SessionRole, TripPacket};
use crate::models::trip::{CancelReason, Trip, TripState};
use crate::services::lifecycle::TripEvent;
use crate::services::location_store::LocationStore;
use crate::services::notifier::Notifier;
use crate::services::registry::TripRegistry;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long a disconnected party may take to re-bind before the trip
    /// is cancelled with reason PeerLost.
    pub grace_window: Duration,
    /// How long a forward may block on a full peer queue before the sender
    /// is signalled Busy. Packets are never dropped silently.
    pub forward_timeout: Duration,
    /// Outbound queue depth per session.
    pub queue_bound: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(60),
            forward_timeout: Duration::from_millis(250),
            queue_bound: 32,
        }
    }
}

/// Returned from a successful bind; the session handler keeps the
/// session_id to authenticate subsequent packets and the disconnect.
#[derive(Debug, Clone)]
pub struct BoundSession {
    pub session_id: String,
    pub trip: Trip,
}

struct ActiveSession {
    session_id: String,
    party_id: String,
    tx: mpsc::Sender<ServerFrame>,
    last_seq: u64,
}

enum RoleSlot {
    Active(ActiveSession),
    /// Disconnected, grace timer armed; a matching re-bind reclaims it.
    Waiting,
}

#[derive(Default)]
struct TripChannel {
    driver: Option<RoleSlot>,
    rider: Option<RoleSlot>,
    driver_generation: u64,
    rider_generation: u64,
    /// Rider notifications held while the rider is in its grace window.
    parked: Vec<TripNotification>,
}

impl TripChannel {
    fn slot(&mut self, role: SessionRole) -> &mut Option<RoleSlot> {
        match role {
            SessionRole::Driver => &mut self.driver,
            SessionRole::Rider => &mut self.rider,
        }
    }

    fn generation(&mut self, role: SessionRole) -> &mut u64 {
        match role {
            SessionRole::Driver => &mut self.driver_generation,
            SessionRole::Rider => &mut self.rider_generation,
        }
    }

    fn peer_tx(&self, role: SessionRole) -> Option<mpsc::Sender<ServerFrame>> {
        let peer = match role.peer() {
            SessionRole::Driver => self.driver.as_ref(),
            SessionRole::Rider => self.rider.as_ref(),
        };
        match peer {
            Some(RoleSlot::Active(session)) => Some(session.tx.clone()),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.driver.is_none() && self.rider.is_none()
    }
}

struct RelayInner {
    registry: Arc<TripRegistry>,
    locations: Arc<LocationStore>,
    notifier: Arc<dyn Notifier>,
    config: RelayConfig,
    channels: Mutex<HashMap<String, TripChannel>>,
}

#[derive(Clone)]
pub struct SessionRelay {
    inner: Arc<RelayInner>,
}

impl SessionRelay {
    pub fn new(
        registry: Arc<TripRegistry>,
        locations: Arc<LocationStore>,
        notifier: Arc<dyn Notifier>,
        config: RelayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry,
                locations,
                notifier,
                config,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bind a session to (trip, role). For a driver binding to a Requested
    /// trip this IS the acceptance: the registry applies Accept and the
    /// single-active-trip invariants decide the winner. Re-binds within the
    /// grace window reclaim the slot; a second live session per role is
    /// rejected with AlreadyBound.
    pub async fn bind(
        &self,
        trip_id: &str,
        role: SessionRole,
        party_id: &str,
        tx: mpsc::Sender<ServerFrame>,
    ) -> Result<BoundSession, RideLinkError> {
        let trip = self
            .inner
            .registry
            .get(trip_id)
            .await
            .ok_or_else(|| RideLinkError::trip_not_found(trip_id))?;

        if trip.state.is_terminal() {
            return Err(RideLinkError::NotBound(format!(
                "trip {} already reached {:?}",
                trip_id, trip.state
            )));
        }

        let trip = match role {
            SessionRole::Rider => {
                if trip.rider_id != party_id {
                    return Err(RideLinkError::NotBound(format!(
                        "rider {} does not own trip {}",
                        party_id, trip_id
                    )));
                }
                trip
            }
            SessionRole::Driver => match &trip.driver_id {
                // Unassigned trip: binding is the acceptance.
                None => {
                    self.inner
                        .registry
                        .apply(trip_id, TripEvent::Accept { driver_id: party_id.to_string() })
                        .await?
                }
                Some(assigned) if assigned == party_id => trip,
                Some(_) => {
                    return Err(RideLinkError::NotBound(format!(
                        "driver {} is not assigned to trip {}",
                        party_id, trip_id
                    )));
                }
            },
        };

        let session_id = nanoid::nanoid!(12);
        let mut flushed = Vec::new();
        {
            let mut channels = self.inner.channels.lock().await;
            let channel = channels.entry(trip_id.to_string()).or_default();
            if matches!(channel.slot(role), Some(RoleSlot::Active(_))) {
                return Err(RideLinkError::AlreadyBound {
                    trip_id: trip_id.to_string(),
                    role: role.as_str().to_string(),
                });
            }
            *channel.generation(role) += 1;
            *channel.slot(role) = Some(RoleSlot::Active(ActiveSession {
                session_id: session_id.clone(),
                party_id: party_id.to_string(),
                tx: tx.clone(),
                last_seq: 0,
            }));
            if role == SessionRole::Rider && !channel.parked.is_empty() {
                flushed = std::mem::take(&mut channel.parked);
            }
        }

        // Notifications parked during the rider's grace window.
        for notification in flushed {
            if tx.try_send(ServerFrame::Notification { notification }).is_err() {
                tracing::warn!("Dropping parked notification for trip {}", trip_id);
            }
        }

        // Let an already-connected rider know acceptance happened.
        if role == SessionRole::Driver && trip.state == TripState::Accepted {
            let ack = TripPacket {
                trip_id: trip_id.to_string(),
                seq: 0,
                payload: PacketPayload::StatusChange { state: TripState::Accepted },
            };
            self.send_to_role(trip_id, SessionRole::Rider, ServerFrame::Packet { packet: ack })
                .await;
        }

        tracing::info!(
            "Session {} bound as {} to trip {} (party {})",
            session_id,
            role.as_str(),
            trip_id,
            party_id
        );
        Ok(BoundSession { session_id, trip })
    }

    /// Validate and process one inbound packet, then forward it to the
    /// bound peer. Stale sequence numbers are dropped quietly; a full peer
    /// queue surfaces as Busy after the forward timeout.
    pub async fn handle_packet(
        &self,
        trip_id: &str,
        role: SessionRole,
        session_id: &str,
        packet: TripPacket,
    ) -> Result<(), RideLinkError> {
        if packet.trip_id != trip_id {
            return Err(RideLinkError::NotBound(format!(
                "packet for trip {} on a session bound to {}",
                packet.trip_id, trip_id
            )));
        }

        let (peer_tx, sender_party) = {
            let mut channels = self.inner.channels.lock().await;
            let channel = channels
                .get_mut(trip_id)
                .ok_or_else(|| RideLinkError::NotBound(trip_id.to_string()))?;
            let slot = channel.slot(role);
            let session = match slot {
                Some(RoleSlot::Active(session)) if session.session_id == session_id => session,
                _ => {
                    return Err(RideLinkError::NotBound(format!(
                        "session {} is no longer bound to trip {}",
                        session_id, trip_id
                    )));
                }
            };

            if packet.seq <= session.last_seq {
                tracing::warn!(
                    "Dropping stale packet seq {} (last {}) on trip {}",
                    packet.seq,
                    session.last_seq,
                    trip_id
                );
                return Ok(());
            }
            session.last_seq = packet.seq;
            let party = session.party_id.clone();
            (channel.peer_tx(role), party)
        };

        // Lifecycle packets go through the state machine before anything is
        // forwarded; a rejected transition leaves the trip untouched and
        // nothing reaches the peer.
        let mut updated: Option<Trip> = None;
        if let Some(event) = payload_event(role, &packet.payload)? {
            updated = Some(self.inner.registry.apply(trip_id, event).await?);
        }

        // Driver position pings also feed the location store; ingestion is
        // independent of the trip's fate.
        if role == SessionRole::Driver {
            if let PacketPayload::LocationPing { fix } = &packet.payload {
                let mut fix = fix.clone();
                fix.driver_id = sender_party;
                self.inner.locations.ingest(fix).await;
            }
        }

        if let Some(tx) = peer_tx {
            let frame = ServerFrame::Packet { packet: packet.clone() };
            match tx.send_timeout(frame, self.inner.config.forward_timeout).await {
                Ok(()) => {}
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    tracing::warn!("Peer queue full on trip {}, signalling Busy", trip_id);
                    return Err(RideLinkError::Busy);
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    // Peer vanished between lookup and send; the disconnect
                    // path owns the grace-window handling.
                    tracing::debug!("Peer channel closed mid-forward on trip {}", trip_id);
                }
            }
        }

        if let Some(trip) = updated {
            self.emit_notification(&trip).await;
        }

        Ok(())
    }

    /// Release a binding. The slot enters the grace window; if no session
    /// re-binds in time the trip is cancelled with reason PeerLost and the
    /// surviving peer is told.
    pub async fn disconnect(&self, trip_id: &str, role: SessionRole, session_id: &str) {
        let generation = {
            let mut channels = self.inner.channels.lock().await;
            let Some(channel) = channels.get_mut(trip_id) else {
                return;
            };
            let owns_slot = matches!(
                channel.slot(role),
                Some(RoleSlot::Active(session)) if session.session_id == session_id
            );
            if !owns_slot {
                return; // superseded or already gone
            }
            *channel.slot(role) = Some(RoleSlot::Waiting);
            *channel.generation(role) += 1;
            *channel.generation(role)
        };

        // Nothing to wait for when the trip already finished.
        match self.inner.registry.get(trip_id).await {
            Some(trip) if trip.is_active() => {}
            _ => {
                self.clear_slot(trip_id, role, generation).await;
                return;
            }
        }

        tracing::info!(
            "{} session left trip {}, grace window armed",
            role.as_str(),
            trip_id
        );

        let relay = self.clone();
        let trip_id = trip_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(relay.inner.config.grace_window).await;
            relay.expire_binding(&trip_id, role, generation).await;
        });
    }

    async fn expire_binding(&self, trip_id: &str, role: SessionRole, generation: u64) {
        if !self.clear_slot(trip_id, role, generation).await {
            return; // re-bound in time, or superseded
        }

        tracing::warn!(
            "Grace window elapsed for {} on trip {}, cancelling",
            role.as_str(),
            trip_id
        );

        let cancelled = self
            .inner
            .registry
            .apply(trip_id, TripEvent::Cancel { reason: CancelReason::PeerLost })
            .await;

        match cancelled {
            Ok(trip) => {
                let notification = TripNotification::trip_cancelled(&trip);
                // The survivor may be either role; tell whoever is left.
                self.send_to_role(
                    trip_id,
                    role.peer(),
                    ServerFrame::Notification { notification: notification.clone() },
                )
                .await;
                if let Err(err) = self.inner.notifier.notify_rider(&trip, &notification).await {
                    tracing::warn!("Notifier failed for trip {}: {}", trip_id, err);
                }
            }
            Err(RideLinkError::InvalidTransition { .. }) => {
                // Trip reached a terminal state on its own in the meantime.
                tracing::debug!("Trip {} already terminal at grace expiry", trip_id);
            }
            Err(err) => {
                tracing::error!("PeerLost cancel failed for trip {}: {}", trip_id, err);
            }
        }
    }

    /// Remove a Waiting slot if the generation still matches. Returns true
    /// when the slot was actually vacated by this call.
    async fn clear_slot(&self, trip_id: &str, role: SessionRole, generation: u64) -> bool {
        let mut channels = self.inner.channels.lock().await;
        let Some(channel) = channels.get_mut(trip_id) else {
            return false;
        };
        if *channel.generation(role) != generation {
            return false;
        }
        if !matches!(channel.slot(role), Some(RoleSlot::Waiting)) {
            return false;
        }
        *channel.slot(role) = None;
        if channel.is_empty() {
            channels.remove(trip_id);
        }
        true
    }

    /// Best-effort frame delivery to one role of a trip.
    async fn send_to_role(&self, trip_id: &str, role: SessionRole, frame: ServerFrame) {
        let tx = {
            let mut channels = self.inner.channels.lock().await;
            match channels.get_mut(trip_id) {
                Some(channel) => match channel.slot(role) {
                    Some(RoleSlot::Active(session)) => Some(session.tx.clone()),
                    _ => None,
                },
                None => None,
            }
        };
        if let Some(tx) = tx {
            if tx.try_send(frame).is_err() {
                tracing::warn!("Dropping frame for busy {} on trip {}", role.as_str(), trip_id);
            }
        }
    }

    /// Synthesize the rider-facing notification for the states that carry
    /// one. Parked for a rider inside its grace window, dropped once the
    /// window has lapsed.
    async fn emit_notification(&self, trip: &Trip) {
        let notification = match trip.state {
            TripState::Arrived => TripNotification::driver_arrived(trip),
            TripState::Ended => TripNotification::trip_ended(trip),
            TripState::Cancelled => TripNotification::trip_cancelled(trip),
            _ => return,
        };

        {
            let mut channels = self.inner.channels.lock().await;
            if let Some(channel) = channels.get_mut(&trip.id) {
                let rider_tx = match channel.slot(SessionRole::Rider) {
                    Some(RoleSlot::Active(session)) => Some(session.tx.clone()),
                    _ => None,
                };
                if let Some(tx) = rider_tx {
                    let frame = ServerFrame::Notification { notification: notification.clone() };
                    if tx.try_send(frame).is_err() {
                        tracing::warn!("Rider queue full, dropping notification");
                    }
                } else if matches!(channel.slot(SessionRole::Rider), Some(RoleSlot::Waiting)) {
                    channel.parked.push(notification.clone());
                }
            }
        }

        if let Err(err) = self.inner.notifier.notify_rider(trip, &notification).await {
            tracing::warn!("Notifier failed for trip {}: {}", trip.id, err);
        }
    }
}

/// Map a packet payload onto the lifecycle event it implies, if any.
/// Enumerated exhaustively so every payload kind and its legal use is
/// visible in one place.
fn payload_event(
    role: SessionRole,
    payload: &PacketPayload,
) -> Result<Option<TripEvent>, RideLinkError> {
    let event = match payload {
        PacketPayload::LocationPing { .. } => None,
        PacketPayload::Arrived => Some(TripEvent::MarkArrived),
        PacketPayload::TripStarted => Some(TripEvent::StartTrip),
        PacketPayload::TripEnded { fare } => Some(TripEvent::EndTrip { fare: fare.clone() }),
        PacketPayload::PaymentConfirmed => None,
        PacketPayload::Message { .. } => None,
        PacketPayload::StatusChange { state } => match state {
            TripState::EnRoute => Some(TripEvent::Depart),
            TripState::Arrived => Some(TripEvent::MarkArrived),
            TripState::InProgress => Some(TripEvent::StartTrip),
            TripState::Cancelled => {
                let reason = match role {
                    SessionRole::Driver => CancelReason::DriverRequest,
                    SessionRole::Rider => CancelReason::RiderRequest,
                };
                Some(TripEvent::Cancel { reason })
            }
            // Requested is never re-entered, Accepted happens at bind and
            // Ended must carry a fare.
            TripState::Requested | TripState::Accepted | TripState::Ended => {
                return Err(RideLinkError::bad_request(format!(
                    "status {:?} cannot be requested via StatusChange",
                    state
                )));
            }
        },
    };
    Ok(event)
}
