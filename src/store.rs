//! Position store — authoritative in-memory map of last-known presences.
//!
//! DESIGN
//! ======
//! `PositionStore` owns `user_id -> UserPresence` behind one `RwLock`; all
//! mutation flows through hub paths, so the lock is the single serialization
//! point for position data. There is no persistence: a presence exists only
//! while its owner keeps sending updates, and the TTL reaper removes
//! everything else.
//!
//! Timestamps are milliseconds since the Unix epoch throughout, produced by
//! `now_ms` so the wire format and the sweep arithmetic agree.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

// =============================================================================
// TYPES
// =============================================================================

/// A user's visibility on the radar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Away,
    Offline,
}

/// Last-known position and status for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Milliseconds since the Unix epoch of the last accepted update.
    pub last_update_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("invalid position: latitude {latitude} must be in [-90, 90] and longitude {longitude} in [-180, 180]")]
    InvalidPosition { latitude: f64, longitude: f64 },
}

/// Current time as milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Default)]
pub struct PositionStore {
    entries: RwLock<HashMap<String, UserPresence>>,
}

impl PositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a presence after validating the coordinates.
    ///
    /// A rejected update leaves the store untouched. An accepted one stamps
    /// `last_update_at` with the current time; the display name is kept from
    /// the existing entry when the caller passes `None`.
    ///
    /// # Errors
    ///
    /// Returns `PositionError::InvalidPosition` for out-of-range or
    /// non-finite coordinates.
    pub async fn upsert(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        status: Status,
        display_name: Option<String>,
    ) -> Result<UserPresence, PositionError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(PositionError::InvalidPosition { latitude, longitude });
        }

        let mut entries = self.entries.write().await;
        let presence = match entries.get_mut(user_id) {
            Some(existing) => {
                existing.latitude = latitude;
                existing.longitude = longitude;
                existing.status = status;
                if display_name.is_some() {
                    existing.display_name = display_name;
                }
                existing.last_update_at = now_ms();
                existing.clone()
            }
            None => {
                let presence = UserPresence {
                    user_id: user_id.to_owned(),
                    latitude,
                    longitude,
                    status,
                    display_name,
                    last_update_at: now_ms(),
                };
                entries.insert(user_id.to_owned(), presence.clone());
                presence
            }
        };
        Ok(presence)
    }

    /// Update the status of an existing presence. A position is not required,
    /// but a user with no presence at all is ignored: there is nothing to
    /// show on the radar until a first position arrives.
    pub async fn set_status(&self, user_id: &str, status: Status) -> Option<UserPresence> {
        let mut entries = self.entries.write().await;
        let presence = entries.get_mut(user_id)?;
        presence.status = status;
        presence.last_update_at = now_ms();
        Some(presence.clone())
    }

    /// Remove a presence. Idempotent.
    pub async fn remove(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }

    /// Remove and return every presence whose `last_update_at` is strictly
    /// older than `now - ttl`. An entry at exactly the boundary is retained;
    /// it will be collected on the next sweep.
    pub async fn sweep_expired(&self, now: i64, ttl: Duration) -> Vec<UserPresence> {
        let cutoff = now - i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut entries = self.entries.write().await;
        let expired: Vec<String> = entries
            .values()
            .filter(|p| p.last_update_at < cutoff)
            .map(|p| p.user_id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|user_id| entries.remove(user_id))
            .collect()
    }

    pub async fn get(&self, user_id: &str) -> Option<UserPresence> {
        self.entries.read().await.get(user_id).cloned()
    }

    /// Consistent snapshot of every tracked presence.
    pub async fn all(&self) -> Vec<UserPresence> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
