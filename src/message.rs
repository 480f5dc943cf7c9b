//! Wire protocol — JSON messages with a `type` discriminator.
//!
//! DESIGN
//! ======
//! Inbound and outbound shapes are separate enums: clients never receive a
//! `ClientMessage` and the server never parses a `ServerMessage`. Both are
//! internally tagged on `type`, so an unknown or missing discriminator fails
//! deserialization and the connection loop drops the message without closing
//! the socket.

use serde::{Deserialize, Serialize};

use crate::store::Status;

// =============================================================================
// INBOUND (client → server)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Full resync request. Sent by compliant clients immediately after
    /// (re)connecting, before anything else.
    RequestRadar,
    /// Position report. The connection's authenticated identity wins over
    /// the optional `user_id` field.
    LocationUpdate {
        #[serde(default)]
        user_id: Option<String>,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        auto_detect: bool,
    },
    /// Explicit status change (online / away / offline).
    StatusUpdate { status: Status },
    /// Application-level heartbeat.
    Ping,
}

// =============================================================================
// OUTBOUND (server → client)
// =============================================================================

/// One position delta, either standalone or inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub auto_detect: bool,
    pub timestamp: i64,
}

/// One entry of a radar snapshot: a presence plus its distance from the
/// viewer, already ordered by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarUser {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub last_update_at: i64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RadarState {
        users: Vec<RadarUser>,
        timestamp: i64,
    },
    LocationUpdate(LocationUpdate),
    BatchLocationUpdate {
        updates: Vec<LocationUpdate>,
        timestamp: i64,
    },
    UserStatusUpdate {
        user_id: String,
        status: Status,
        timestamp: i64,
    },
    Pong,
}

// =============================================================================
// TESTS
// =============================================================================
