//! WebSocket handler — the radar relay's duplex endpoint.
//!
//! DESIGN
//! ======
//! On upgrade, the connection registers its outbound queue and enters a
//! `select!` loop:
//! - Incoming client messages → parse + dispatch through the hub
//! - Queued fan-out from peers → forward to the socket
//!
//! Unparseable or unknown inbound messages are dropped, never fatal: a
//! best-effort relay drops a bad message, it does not drop the client.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (rejected before handshake when `user_id` is missing)
//! 2. Register → initial `radar_state` snapshot within the handshake window
//! 3. Open: dispatch inbound, forward fan-out, watch the heartbeat
//! 4. Closed (client close, error, idle timeout, superseded) → unregister;
//!    the presence entry survives until the TTL reaper — a network blip
//!    must not erase someone from the radar.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

use crate::hub;
use crate::message::{ClientMessage, ServerMessage};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = params.get("user_id").filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "user_id required").into_response();
    };

    let user_id = user_id.clone();
    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: String) {
    // Per-connection queue for fan-out from peers. Registering supersedes
    // any previous connection for this user.
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.channel_capacity);
    let conn_id = state.registry.register(&user_id, tx).await;
    info!(%user_id, %conn_id, "ws: client connected");

    // Connecting → Open: a reconnecting client has no usable state, so every
    // connection starts from a full snapshot. If it cannot be delivered
    // within the handshake window, give up and roll back the registration.
    let snapshot = hub::snapshot_for(&state, &user_id).await;
    let handshake = timeout(state.config.handshake_timeout, send_message(&mut socket, &snapshot)).await;
    if !matches!(handshake, Ok(Ok(()))) {
        warn!(%user_id, %conn_id, "ws: handshake incomplete; abandoning connection");
        state.registry.unregister(&user_id, conn_id).await;
        return;
    }

    let mut last_inbound = Instant::now();
    let mut idle_check = tokio::time::interval(idle_check_period(&state));
    idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    'conn: loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else { break 'conn };
                match message {
                    Message::Text(text) => {
                        last_inbound = Instant::now();
                        state.registry.touch(&user_id).await;
                        for reply in dispatch_text(&state, &user_id, &text).await {
                            if send_message(&mut socket, &reply).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => {
                        last_inbound = Instant::now();
                        state.registry.touch(&user_id).await;
                    }
                    Message::Close(_) => break 'conn,
                    Message::Binary(_) => {}
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_message(&mut socket, &message).await.is_err() {
                            break 'conn;
                        }
                    }
                    // Sender dropped: this connection was superseded.
                    None => break 'conn,
                }
            }
            _ = idle_check.tick() => {
                if last_inbound.elapsed() >= state.config.heartbeat_timeout {
                    warn!(%user_id, %conn_id, "ws: heartbeat missed; closing");
                    break 'conn;
                }
            }
        }
    }

    // Release the registry entry before the close completes so this
    // connection stops appearing in fan-outs. The presence stays for the
    // TTL reaper.
    state.registry.unregister(&user_id, conn_id).await;
    info!(%user_id, %conn_id, "ws: client disconnected");
}

fn idle_check_period(state: &AppState) -> std::time::Duration {
    (state.config.heartbeat_timeout / 2).max(std::time::Duration::from_secs(1))
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse one inbound text frame and return the frames owed to the sender.
///
/// Kept separate from the socket loop so message handling is testable
/// without a live connection.
async fn dispatch_text(state: &AppState, user_id: &str, text: &str) -> Vec<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(%user_id, error = %e, "ws: dropping unparseable message");
            return Vec::new();
        }
    };
    hub::handle_message(state, user_id, message).await
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize outbound message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
