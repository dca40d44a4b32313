// tests/trip_flow.rs
//
// End-to-end trip scenarios over the service layer: request, accept via
// session bind, lifecycle packets relayed between the two peers, terminal
// notifications, feedback, and the reconnection grace window.
use std::time::Duration;

use tokio::sync::mpsc;

use ridelink::errors::RideLinkError;
use ridelink::models::feedback::Feedback;
use ridelink::models::packet::{PacketPayload, ServerFrame, SessionRole, TripPacket};
use ridelink::models::trip::{CancelReason, Fare, Stop, TripState};
use ridelink::services::feedback_service::FeedbackOperations;
use ridelink::services::lifecycle::TripEvent;
use ridelink::state::{AppConfig, AppState};

fn stops() -> Vec<Stop> {
    vec![
        Stop { latitude: 1.0, longitude: 1.0, address: "Pickup".to_string() },
        Stop { latitude: 2.0, longitude: 2.0, address: "Dropoff".to_string() },
    ]
}

fn packet(trip_id: &str, seq: u64, payload: PacketPayload) -> TripPacket {
    TripPacket { trip_id: trip_id.to_string(), seq, payload }
}

async fn app() -> AppState {
    AppState::new(AppConfig::default()).await.expect("app state")
}

#[tokio::test]
async fn full_trip_lifecycle_with_fare_notification() {
    let app = app().await;

    // Rider 42 requests a ride from (1,1) to (2,2).
    let trip = app.registry.create("rid-42", stops()).await.unwrap();
    assert_eq!(trip.state, TripState::Requested);

    // Driver 7 connects and binds; the bind is the acceptance.
    let (driver_tx, mut driver_rx) = mpsc::channel(32);
    let driver = app
        .relay
        .bind(&trip.id, SessionRole::Driver, "drv-7", driver_tx)
        .await
        .unwrap();
    assert_eq!(driver.trip.state, TripState::Accepted);
    assert_eq!(app.registry.active_for_driver("drv-7").await.unwrap().id, trip.id);

    // A second driver cannot take the same trip.
    let second = app
        .registry
        .apply(&trip.id, TripEvent::Accept { driver_id: "drv-9".to_string() })
        .await;
    assert!(matches!(second, Err(RideLinkError::InvalidTransition { .. })));

    // Rider binds too.
    let (rider_tx, mut rider_rx) = mpsc::channel(32);
    let rider = app
        .relay
        .bind(&trip.id, SessionRole::Rider, "rid-42", rider_tx)
        .await
        .unwrap();

    // Driver walks the trip through its lifecycle.
    let driver_send = |seq: u64, payload: PacketPayload| {
        let relay = app.relay.clone();
        let trip_id = trip.id.clone();
        let session_id = driver.session_id.clone();
        async move {
            relay
                .handle_packet(
                    &trip_id,
                    SessionRole::Driver,
                    &session_id,
                    packet(&trip_id, seq, payload),
                )
                .await
        }
    };

    driver_send(1, PacketPayload::StatusChange { state: TripState::EnRoute }).await.unwrap();
    driver_send(2, PacketPayload::Arrived).await.unwrap();
    driver_send(3, PacketPayload::TripStarted).await.unwrap();
    driver_send(
        4,
        PacketPayload::TripEnded { fare: Fare { amount: 12.5, currency: "USD".to_string() } },
    )
    .await
    .unwrap();

    let ended = app.registry.get(&trip.id).await.unwrap();
    assert_eq!(ended.state, TripState::Ended);
    assert_eq!(ended.fare.as_ref().unwrap().amount, 12.5);

    // The rider saw every packet in order plus the arrival and fare
    // notifications.
    let mut forwarded = Vec::new();
    let mut notifications = Vec::new();
    while let Ok(frame) = rider_rx.try_recv() {
        match frame {
            ServerFrame::Packet { packet } => forwarded.push(packet.seq),
            ServerFrame::Notification { notification } => notifications.push(notification),
            _ => {}
        }
    }
    assert_eq!(forwarded, vec![1, 2, 3, 4]);

    let fare_note = notifications
        .iter()
        .find(|notification| notification.fare.is_some())
        .expect("fare notification");
    assert_eq!(fare_note.fare.as_deref(), Some("12.50"));
    assert_eq!(fare_note.currency.as_deref(), Some("USD"));

    // Rider can rate the ended trip; a retry of the same content is a
    // clean no-op.
    let feedback = Feedback {
        trip_id: trip.id.clone(),
        rating: 5,
        comment: Some("smooth ride".to_string()),
    };
    let first = app.feedback.provide_feedback(feedback.clone()).await.unwrap();
    let retry = app.feedback.provide_feedback(feedback).await.unwrap();
    assert_eq!(first, retry);
    assert_eq!(app.registry.get(&trip.id).await.unwrap().rating, Some(5));

    // Driver never hears their own packets back.
    while let Ok(frame) = driver_rx.try_recv() {
        assert!(!matches!(frame, ServerFrame::Packet { .. }));
    }

    // Both parties can close down; the trip is terminal so no grace
    // cancellation fires.
    app.relay.disconnect(&trip.id, SessionRole::Driver, &driver.session_id).await;
    app.relay.disconnect(&trip.id, SessionRole::Rider, &rider.session_id).await;
    assert_eq!(app.registry.get(&trip.id).await.unwrap().state, TripState::Ended);
}

#[tokio::test(start_paused = true)]
async fn driver_reconnects_within_grace_window() {
    let app = app().await;
    let trip = app.registry.create("rid-42", stops()).await.unwrap();

    let (driver_tx, _driver_rx) = mpsc::channel(32);
    let driver = app
        .relay
        .bind(&trip.id, SessionRole::Driver, "drv-7", driver_tx)
        .await
        .unwrap();

    app.relay.disconnect(&trip.id, SessionRole::Driver, &driver.session_id).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    // Same driver, fresh session: the binding is reclaimed.
    let (tx2, _rx2) = mpsc::channel(32);
    let rebound = app.relay.bind(&trip.id, SessionRole::Driver, "drv-7", tx2).await.unwrap();
    assert_eq!(rebound.trip.state, TripState::Accepted);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(app.registry.get(&trip.id).await.unwrap().state, TripState::Accepted);
}

#[tokio::test(start_paused = true)]
async fn grace_window_expiry_cancels_and_notifies_rider() {
    let app = app().await;
    let trip = app.registry.create("rid-42", stops()).await.unwrap();

    let (driver_tx, _driver_rx) = mpsc::channel(32);
    let driver = app
        .relay
        .bind(&trip.id, SessionRole::Driver, "drv-7", driver_tx)
        .await
        .unwrap();
    let (rider_tx, mut rider_rx) = mpsc::channel(32);
    app.relay.bind(&trip.id, SessionRole::Rider, "rid-42", rider_tx).await.unwrap();

    app.relay.disconnect(&trip.id, SessionRole::Driver, &driver.session_id).await;
    tokio::time::sleep(Duration::from_secs(61)).await;

    let cancelled = app.registry.get(&trip.id).await.unwrap();
    assert_eq!(cancelled.state, TripState::Cancelled);
    assert_eq!(cancelled.cancel_reason, Some(CancelReason::PeerLost));
    // The rider slot is free again for history queries; no active trip.
    assert!(app.registry.active_for_rider("rid-42").await.is_none());

    let mut cancellation_seen = false;
    while let Ok(frame) = rider_rx.try_recv() {
        if let ServerFrame::Notification { notification } = frame {
            if notification.title.contains("Cancelled") {
                cancellation_seen = true;
            }
        }
    }
    assert!(cancellation_seen);
}

#[tokio::test(start_paused = true)]
async fn rider_in_grace_window_gets_parked_notifications_on_rebind() {
    let app = app().await;
    let trip = app.registry.create("rid-42", stops()).await.unwrap();

    let (driver_tx, _driver_rx) = mpsc::channel(32);
    let driver = app
        .relay
        .bind(&trip.id, SessionRole::Driver, "drv-7", driver_tx)
        .await
        .unwrap();
    let (rider_tx, _rider_rx) = mpsc::channel(32);
    let rider = app
        .relay
        .bind(&trip.id, SessionRole::Rider, "rid-42", rider_tx)
        .await
        .unwrap();

    // Rider drops; driver arrives while the rider is away.
    app.relay.disconnect(&trip.id, SessionRole::Rider, &rider.session_id).await;
    app.relay
        .handle_packet(
            &trip.id,
            SessionRole::Driver,
            &driver.session_id,
            packet(&trip.id, 1, PacketPayload::Arrived),
        )
        .await
        .unwrap();

    // Rider comes back inside the window and receives the parked arrival.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let (tx2, mut rx2) = mpsc::channel(32);
    app.relay.bind(&trip.id, SessionRole::Rider, "rid-42", tx2).await.unwrap();

    let mut parked_arrival = false;
    while let Ok(frame) = rx2.try_recv() {
        if let ServerFrame::Notification { notification } = frame {
            if notification.title.contains("Arrived") {
                parked_arrival = true;
            }
        }
    }
    assert!(parked_arrival);
    assert_eq!(app.registry.get(&trip.id).await.unwrap().state, TripState::Arrived);
}

#[tokio::test]
async fn concurrent_ride_requests_for_one_rider() {
    let app = std::sync::Arc::new(app().await);

    let a = {
        let app = std::sync::Arc::clone(&app);
        tokio::spawn(async move { app.registry.create("rid-42", stops()).await })
    };
    let b = {
        let app = std::sync::Arc::clone(&app);
        tokio::spawn(async move { app.registry.create("rid-42", stops()).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|result| matches!(result, Err(RideLinkError::Conflict(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn location_pings_flow_to_the_store_during_a_trip() {
    let app = app().await;
    let trip = app.registry.create("rid-42", stops()).await.unwrap();

    let (driver_tx, _driver_rx) = mpsc::channel(32);
    let driver = app
        .relay
        .bind(&trip.id, SessionRole::Driver, "drv-7", driver_tx)
        .await
        .unwrap();

    let fix = ridelink::models::location::LocationFix {
        driver_id: "drv-7".to_string(),
        latitude: 1.5,
        longitude: 1.5,
        recorded_at: chrono::Utc::now(),
        bearing: Some(90.0),
        speed: Some(40.0),
    };
    app.relay
        .handle_packet(
            &trip.id,
            SessionRole::Driver,
            &driver.session_id,
            packet(&trip.id, 1, PacketPayload::LocationPing { fix }),
        )
        .await
        .unwrap();

    let current = app.locations.current_for("drv-7").await.expect("current fix");
    assert_eq!(current.latitude, 1.5);
}
