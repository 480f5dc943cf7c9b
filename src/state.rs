//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the two mutable shared resources — the position store and the
//! connection registry — plus the sender side of the delta coalescer. Both
//! resources serialize their own mutations internally; nothing outside the
//! hub paths touches them directly.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RadarConfig;
use crate::hub::{self, PendingDelta};
use crate::registry::ConnectionRegistry;
use crate::store::PositionStore;

/// Shared application state. Clone is required by Axum — inner fields are
/// Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub config: RadarConfig,
    pub store: Arc<PositionStore>,
    pub registry: Arc<ConnectionRegistry>,
    /// Queue into the coalescer worker; location deltas are batched per
    /// viewer before fan-out.
    pub coalesce_tx: mpsc::Sender<PendingDelta>,
}

impl AppState {
    /// Build the state and spawn the coalescer worker. Requires a running
    /// tokio runtime.
    #[must_use]
    pub fn new(config: RadarConfig) -> Self {
        let store = Arc::new(PositionStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let coalesce_tx = hub::spawn_coalescer(Arc::clone(&registry), config);
        Self { config, store, registry, coalesce_tx }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::HashSet;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::message::ServerMessage;
    use crate::store::Status;

    /// Config with short windows so tests run in milliseconds.
    #[must_use]
    pub fn test_config() -> RadarConfig {
        RadarConfig {
            radius_km: 5.0,
            presence_ttl: Duration::from_millis(400),
            coalesce_window: Duration::from_millis(40),
            handshake_timeout: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(10),
            channel_capacity: 32,
        }
    }

    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(test_config())
    }

    /// Register a probe connection and return its id plus the receiving end
    /// of its outbound queue.
    pub async fn connect_probe(state: &AppState, user_id: &str) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(state.config.channel_capacity);
        let conn_id = state.registry.register(user_id, tx).await;
        (conn_id, rx)
    }

    /// Seed a presence directly into the store.
    pub async fn seed_presence(state: &AppState, user_id: &str, latitude: f64, longitude: f64) {
        state
            .store
            .upsert(user_id, latitude, longitude, Status::Online, None)
            .await
            .expect("seed coordinates should be valid");
    }

    /// Mark `viewer` as tracking each id in `targets`.
    pub async fn seed_tracking(state: &AppState, viewer: &str, targets: &[&str]) {
        let set: HashSet<String> = targets.iter().map(|s| (*s).to_owned()).collect();
        state.registry.replace_tracking(viewer, set).await;
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers;

    #[tokio::test]
    async fn new_state_is_empty() {
        let state = test_helpers::test_app_state();
        assert!(state.store.is_empty().await);
        assert!(state.registry.is_empty().await);
    }
}
