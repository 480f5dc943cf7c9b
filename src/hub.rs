//! Radar hub — orchestration between store, proximity, and registry.
//!
//! DESIGN
//! ======
//! Inbound messages are validated here, mutate the position store, and fan
//! out as deltas through the connection registry. Handlers return frames for
//! the sender; everything peer-bound goes through the registry so a slow or
//! dead peer never affects the sender.
//!
//! Location deltas are not sent inline: they are queued to a coalescer
//! worker that batches per viewer over a short window, so a burst of updates
//! becomes one `batch_location_update` per viewer instead of a message per
//! move. Status changes bypass the coalescer — they are rare and clients
//! want them promptly.
//!
//! A reaper task sweeps presences whose owner stopped sending updates
//! without an explicit disconnect, and tells their last-known viewers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::RadarConfig;
use crate::message::{ClientMessage, LocationUpdate, RadarUser, ServerMessage};
use crate::proximity;
use crate::registry::ConnectionRegistry;
use crate::state::AppState;
use crate::store::{PositionError, Status, UserPresence, now_ms};

/// Queue depth between update handlers and the coalescer worker.
const COALESCE_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// DISPATCH
// =============================================================================

/// Process one inbound message and return the frames owed to the sender.
///
/// Peer-bound traffic (deltas, status changes) is fanned out from here via
/// the registry; the caller only transmits the returned frames. Invalid
/// payloads are dropped without a reply — the relay is best-effort and a
/// malformed message must never cost the sender its connection.
pub async fn handle_message(state: &AppState, user_id: &str, message: ClientMessage) -> Vec<ServerMessage> {
    match message {
        ClientMessage::RequestRadar => vec![snapshot_for(state, user_id).await],
        ClientMessage::LocationUpdate { user_id: claimed, latitude, longitude, auto_detect } => {
            if claimed.as_deref().is_some_and(|c| c != user_id) {
                // The connection's authenticated identity wins.
                debug!(%user_id, claimed = claimed.as_deref().unwrap_or(""), "ignoring mismatched user_id in payload");
            }
            if let Err(e) = apply_location_update(state, user_id, latitude, longitude, auto_detect).await {
                warn!(%user_id, error = %e, "dropping location update");
            }
            vec![]
        }
        ClientMessage::StatusUpdate { status } => {
            apply_status_update(state, user_id, status).await;
            vec![]
        }
        ClientMessage::Ping => vec![ServerMessage::Pong],
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Build a fresh `radar_state` for one viewer and reset their tracking set
/// to exactly what the snapshot shows.
///
/// A viewer with no stored position yet gets an empty snapshot; the radar
/// has no reference point to measure from until their first update.
pub async fn snapshot_for(state: &AppState, user_id: &str) -> ServerMessage {
    let all = state.store.all().await;
    let me = all.iter().find(|p| p.user_id == user_id).cloned();

    let (users, tracked) = match me {
        Some(me) => {
            let hits = proximity::near(&all, me.latitude, me.longitude, state.config.radius_km, Some(user_id));
            let tracked: HashSet<String> = hits.iter().map(|n| n.presence.user_id.clone()).collect();
            let users = hits
                .into_iter()
                .map(|n| RadarUser {
                    user_id: n.presence.user_id,
                    latitude: n.presence.latitude,
                    longitude: n.presence.longitude,
                    status: n.presence.status,
                    display_name: n.presence.display_name,
                    last_update_at: n.presence.last_update_at,
                    distance_km: n.distance_km,
                })
                .collect();
            (users, tracked)
        }
        None => (Vec::new(), HashSet::new()),
    };

    state.registry.replace_tracking(user_id, tracked).await;
    ServerMessage::RadarState { users, timestamp: now_ms() }
}

// =============================================================================
// POSITION UPDATES
// =============================================================================

/// Validate and apply one position update, then queue deltas to every
/// affected viewer.
///
/// Affected is the symmetric difference of visibility: any connected viewer
/// within radius of the old position (the mover may have left their view)
/// or of the new one (the mover may have entered it).
///
/// # Errors
///
/// Returns `PositionError::InvalidPosition` without touching state or
/// sending anything.
pub async fn apply_location_update(
    state: &AppState,
    user_id: &str,
    latitude: f64,
    longitude: f64,
    auto_detect: bool,
) -> Result<UserPresence, PositionError> {
    let previous = state.store.get(user_id).await;
    let presence = state
        .store
        .upsert(user_id, latitude, longitude, Status::Online, None)
        .await?;

    let viewers = affected_viewers(state, user_id, previous.as_ref(), &presence).await;
    if !viewers.is_empty() {
        for viewer in &viewers {
            state.registry.track(viewer, user_id).await;
        }
        let update = LocationUpdate {
            user_id: user_id.to_owned(),
            latitude,
            longitude,
            auto_detect,
            timestamp: presence.last_update_at,
        };
        match state.coalesce_tx.try_send(PendingDelta { viewers, update }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%user_id, "coalesce queue full; dropping delta");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%user_id, "coalesce queue closed; dropping delta");
            }
        }
    }
    Ok(presence)
}

/// Connected viewers whose radius covers the old or the new position.
async fn affected_viewers(
    state: &AppState,
    mover_id: &str,
    previous: Option<&UserPresence>,
    current: &UserPresence,
) -> Vec<String> {
    let snapshot = state.store.all().await;
    let positions: HashMap<&str, &UserPresence> = snapshot.iter().map(|p| (p.user_id.as_str(), p)).collect();
    let radius = state.config.radius_km;

    let mut viewers = Vec::new();
    for viewer_id in state.registry.connected_ids().await {
        if viewer_id == mover_id {
            continue;
        }
        let Some(viewer) = positions.get(viewer_id.as_str()) else {
            // No reference point yet; they resync via request_radar.
            continue;
        };
        let sees_new =
            proximity::haversine_km(viewer.latitude, viewer.longitude, current.latitude, current.longitude) <= radius;
        let sees_old = previous.is_some_and(|old| {
            proximity::haversine_km(viewer.latitude, viewer.longitude, old.latitude, old.longitude) <= radius
        });
        if sees_new || sees_old {
            viewers.push(viewer_id);
        }
    }
    viewers
}

// =============================================================================
// STATUS UPDATES
// =============================================================================

/// Apply a status change and notify every viewer currently tracking the
/// user. A user with no presence yet is ignored.
pub async fn apply_status_update(state: &AppState, user_id: &str, status: Status) -> Option<UserPresence> {
    let updated = state.store.set_status(user_id, status).await?;

    let viewers = state.registry.viewers_tracking(user_id).await;
    if !viewers.is_empty() {
        let message = ServerMessage::UserStatusUpdate {
            user_id: user_id.to_owned(),
            status,
            timestamp: updated.last_update_at,
        };
        state.registry.broadcast_to(&viewers, &message).await;
    }
    Some(updated)
}

// =============================================================================
// COALESCER
// =============================================================================

/// A delta plus the viewers it is owed to.
#[derive(Debug)]
pub struct PendingDelta {
    pub viewers: Vec<String>,
    pub update: LocationUpdate,
}

/// Spawn the coalescer worker and return its queue sender.
///
/// The worker accumulates deltas per viewer and flushes on a fixed ticker:
/// one pending delta becomes a `location_update`, several become one
/// `batch_location_update`. Repeated moves by the same user within a window
/// collapse to the latest.
#[must_use]
pub fn spawn_coalescer(registry: Arc<ConnectionRegistry>, config: RadarConfig) -> mpsc::Sender<PendingDelta> {
    let (tx, mut rx) = mpsc::channel::<PendingDelta>(COALESCE_QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut pending: HashMap<String, Vec<LocationUpdate>> = HashMap::new();
        let mut ticker = tokio::time::interval(config.coalesce_window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_delta = rx.recv() => {
                    match maybe_delta {
                        Some(delta) => merge_delta(&mut pending, delta),
                        None => {
                            flush_pending(&registry, &mut pending).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    flush_pending(&registry, &mut pending).await;
                }
            }
        }
    });

    tx
}

fn merge_delta(pending: &mut HashMap<String, Vec<LocationUpdate>>, delta: PendingDelta) {
    for viewer in delta.viewers {
        let queue = pending.entry(viewer).or_default();
        match queue.iter_mut().find(|u| u.user_id == delta.update.user_id) {
            Some(slot) => *slot = delta.update.clone(),
            None => queue.push(delta.update.clone()),
        }
    }
}

async fn flush_pending(registry: &ConnectionRegistry, pending: &mut HashMap<String, Vec<LocationUpdate>>) {
    if pending.is_empty() {
        return;
    }
    for (viewer, mut updates) in pending.drain() {
        let message = if updates.len() == 1 {
            ServerMessage::LocationUpdate(updates.remove(0))
        } else {
            ServerMessage::BatchLocationUpdate { updates, timestamp: now_ms() }
        };
        registry.send(&viewer, message).await;
    }
}

// =============================================================================
// REAPER
// =============================================================================

/// Spawn the TTL reaper. Runs at half the presence TTL on its own timer,
/// independent of connection traffic.
pub fn spawn_reaper(state: AppState) -> JoinHandle<()> {
    let period = state.config.presence_ttl / 2;
    info!(ttl_ms = state.config.presence_ttl.as_millis() as u64, "presence reaper configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; skip it so a
        // fresh process does not sweep before anyone could update.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reap_once(&state, now_ms()).await;
        }
    })
}

/// One reaper pass: sweep expired presences, push a final offline status to
/// each swept user's last-known viewers, and clear them from tracking sets.
pub(crate) async fn reap_once(state: &AppState, now: i64) {
    let swept = state.store.sweep_expired(now, state.config.presence_ttl).await;
    for presence in swept {
        let viewers = state.registry.viewers_tracking(&presence.user_id).await;
        if presence.status == Status::Online && !viewers.is_empty() {
            let message = ServerMessage::UserStatusUpdate {
                user_id: presence.user_id.clone(),
                status: Status::Offline,
                timestamp: now,
            };
            state.registry.broadcast_to(&viewers, &message).await;
        }
        state.registry.forget_everywhere(&presence.user_id).await;
        info!(user_id = %presence.user_id, "presence expired");
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
