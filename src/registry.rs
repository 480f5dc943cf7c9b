//! Connection registry — live outbound channels keyed by user.
//!
//! DESIGN
//! ======
//! One entry per user_id, holding the bounded sender for that connection's
//! outbound queue plus the set of user_ids the connection is currently
//! tracking (everything it has been shown in a snapshot or update stream).
//! Registering a second connection for the same user supersedes the first:
//! the old sender is dropped here, which the old socket loop observes as
//! channel closure and exits. The swap is internal — peers see no status
//! flicker from a reconnect.
//!
//! Sends are best-effort and never block: a full queue drops the message
//! (slow consumers lose deltas, they do not stall the hub), a closed channel
//! evicts the entry.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::ServerMessage;
use crate::store::now_ms;

// =============================================================================
// TYPES
// =============================================================================

/// One live connection's bookkeeping.
pub struct Connection {
    pub conn_id: Uuid,
    pub user_id: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub connected_at: i64,
    pub last_seen_at: i64,
    /// User ids this connection has been shown; status fan-out targets these.
    pub tracking: HashSet<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    conns: tokio::sync::RwLock<HashMap<String, Connection>>,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding any existing one for the same
    /// user. Returns the new connection's id; cleanup paths pass it back so
    /// a superseded connection cannot evict its successor.
    pub async fn register(&self, user_id: &str, tx: mpsc::Sender<ServerMessage>) -> Uuid {
        let conn_id = Uuid::new_v4();
        let now = now_ms();
        let connection = Connection {
            conn_id,
            user_id: user_id.to_owned(),
            tx,
            connected_at: now,
            last_seen_at: now,
            tracking: HashSet::new(),
        };

        let mut conns = self.conns.write().await;
        if let Some(old) = conns.insert(user_id.to_owned(), connection) {
            info!(%user_id, old_conn = %old.conn_id, new_conn = %conn_id, "superseding existing connection");
        }
        conn_id
    }

    /// Remove a connection. Idempotent; a stale `conn_id` (the entry was
    /// already superseded) is a no-op.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let mut conns = self.conns.write().await;
        if conns.get(user_id).is_some_and(|c| c.conn_id == conn_id) {
            conns.remove(user_id);
        }
    }

    /// Refresh `last_seen_at` on inbound traffic.
    pub async fn touch(&self, user_id: &str) {
        if let Some(conn) = self.conns.write().await.get_mut(user_id) {
            conn.last_seen_at = now_ms();
        }
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.conns.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.read().await.is_empty()
    }
}

// =============================================================================
// SEND
// =============================================================================

impl ConnectionRegistry {
    /// Best-effort send to one user's connection. Never blocks. A full queue
    /// drops the message; a closed channel evicts the registration so the
    /// user stops appearing in future fan-outs.
    pub async fn send(&self, user_id: &str, message: ServerMessage) {
        let target = {
            let conns = self.conns.read().await;
            conns.get(user_id).map(|c| (c.conn_id, c.tx.clone()))
        };
        let Some((conn_id, tx)) = target else {
            return;
        };

        match tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(%user_id, "outbound queue full; dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%user_id, "outbound channel closed; unregistering");
                self.unregister(user_id, conn_id).await;
            }
        }
    }

    /// Fan a message out to a set of users. Partial failures drop silently.
    pub async fn broadcast_to(&self, user_ids: &[String], message: &ServerMessage) {
        for user_id in user_ids {
            self.send(user_id, message.clone()).await;
        }
    }
}

// =============================================================================
// TRACKING
// =============================================================================

impl ConnectionRegistry {
    /// Record that `viewer_id` has been shown `target_id`.
    pub async fn track(&self, viewer_id: &str, target_id: &str) {
        if let Some(conn) = self.conns.write().await.get_mut(viewer_id) {
            conn.tracking.insert(target_id.to_owned());
        }
    }

    /// Replace a viewer's tracking set wholesale (after a full snapshot).
    pub async fn replace_tracking(&self, viewer_id: &str, targets: HashSet<String>) {
        if let Some(conn) = self.conns.write().await.get_mut(viewer_id) {
            conn.tracking = targets;
        }
    }

    /// Every connected user currently tracking `target_id`.
    pub async fn viewers_tracking(&self, target_id: &str) -> Vec<String> {
        self.conns
            .read()
            .await
            .values()
            .filter(|c| c.tracking.contains(target_id))
            .map(|c| c.user_id.clone())
            .collect()
    }

    /// Drop `target_id` from every tracking set (after the reaper removes
    /// its presence).
    pub async fn forget_everywhere(&self, target_id: &str) {
        for conn in self.conns.write().await.values_mut() {
            conn.tracking.remove(target_id);
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
