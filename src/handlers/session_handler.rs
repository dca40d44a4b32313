// src/handlers/session_handler.rs
//
// WebSocket endpoints: the two duplex trip sessions and the
// fire-and-forget driver location stream. One task per connection reads
// frames; a writer task drains the session's bounded outbound queue.
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing;

use crate::errors::RideLinkError;
use crate::models::location::LocationFix;
use crate::models::packet::{ClientFrame, ServerFrame, SessionRole};
use crate::state::AppState;

pub async fn driver_trip_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_trip_socket(state, socket, SessionRole::Driver))
}

pub async fn rider_trip_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_trip_socket(state, socket, SessionRole::Rider))
}

pub async fn driver_locations_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_location_socket(state, socket))
}

struct Binding {
    trip_id: String,
    party_id: String,
    session_id: String,
}

async fn handle_trip_socket(state: Arc<AppState>, socket: WebSocket, role: SessionRole) {
    let (mut ws_write, mut ws_read) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(state.config.relay_queue_bound);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!("Failed to encode server frame: {}", err);
                    continue;
                }
            };
            if ws_write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut binding: Option<Binding> = None;

    while let Some(msg) = ws_read.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!("{} session read error: {}", role.as_str(), err);
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(err) => {
                send_error(&tx, &RideLinkError::JsonParsing(err.to_string()));
                continue;
            }
        };

        match frame {
            ClientFrame::Bind { trip_id, party_id } => {
                if binding.is_some() {
                    send_error(
                        &tx,
                        &RideLinkError::NotBound("connection is already bound".to_string()),
                    );
                    continue;
                }
                match state.relay.bind(&trip_id, role, &party_id, tx.clone()).await {
                    Ok(session) => {
                        if role == SessionRole::Driver {
                            state.drivers.set_connected(&party_id, true).await;
                        }
                        let bound = ServerFrame::Bound {
                            trip_id: trip_id.clone(),
                            session_id: session.session_id.clone(),
                            state: session.trip.state,
                        };
                        if tx.try_send(bound).is_err() {
                            break;
                        }
                        binding = Some(Binding {
                            trip_id,
                            party_id,
                            session_id: session.session_id,
                        });
                    }
                    Err(err) => {
                        send_error(&tx, &err);
                        // Binding misuse closes the connection; the client
                        // must reconnect to try again.
                        break;
                    }
                }
            }
            ClientFrame::Packet { packet } => {
                let Some(bound) = &binding else {
                    send_error(
                        &tx,
                        &RideLinkError::NotBound("bind before sending packets".to_string()),
                    );
                    continue;
                };
                match state
                    .relay
                    .handle_packet(&bound.trip_id, role, &bound.session_id, packet)
                    .await
                {
                    Ok(()) => {}
                    Err(err) => {
                        let fatal = matches!(
                            err,
                            RideLinkError::StoreConnection(_)
                                | RideLinkError::StoreQuery(_)
                                | RideLinkError::StoreSerialization(_)
                        );
                        send_error(&tx, &err);
                        if fatal {
                            // Durable-write failures tear down this trip's
                            // session; the process keeps running.
                            tracing::error!(
                                "Fatal store error on trip {}: {}",
                                bound.trip_id,
                                err
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(bound) = binding {
        state.relay.disconnect(&bound.trip_id, role, &bound.session_id).await;
        if role == SessionRole::Driver {
            state.drivers.set_connected(&bound.party_id, false).await;
        }
    }
    writer.abort();
}

/// Long-lived inbound stream of location fixes. No per-fix response;
/// malformed frames are logged and skipped, out-of-range fixes are
/// discarded by the store itself.
async fn handle_location_socket(state: Arc<AppState>, mut socket: WebSocket) {
    let mut connected_driver: Option<String> = None;

    while let Some(msg) = socket.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!("location stream read error: {}", err);
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let fix: LocationFix = match serde_json::from_str(&text) {
            Ok(fix) => fix,
            Err(err) => {
                tracing::warn!("Skipping unparseable location fix: {}", err);
                continue;
            }
        };

        if connected_driver.as_deref() != Some(fix.driver_id.as_str()) {
            if let Some(previous) = connected_driver.take() {
                state.drivers.set_connected(&previous, false).await;
            }
            state.drivers.set_connected(&fix.driver_id, true).await;
            connected_driver = Some(fix.driver_id.clone());
        }

        state.locations.ingest(fix).await;
    }

    if let Some(driver_id) = connected_driver {
        state.drivers.set_connected(&driver_id, false).await;
    }
}

fn send_error(tx: &mpsc::Sender<ServerFrame>, err: &RideLinkError) {
    let frame = ServerFrame::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    };
    if tx.try_send(frame).is_err() {
        tracing::debug!("Could not queue error frame: {}", err);
    }
}
