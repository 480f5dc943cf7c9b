//! Runtime configuration, loaded from environment variables.

use std::time::Duration;

const DEFAULT_RADIUS_KM: f64 = 15.0;
const DEFAULT_PRESENCE_TTL_SECS: u64 = 120;
const DEFAULT_COALESCE_MS: u64 = 200;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tuning knobs for the radar relay.
///
/// The coalescing window and presence TTL are deployment knobs, not fixed
/// constants: small windows favor latency, large ones favor fewer messages.
#[derive(Debug, Clone, Copy)]
pub struct RadarConfig {
    /// Radius in kilometers within which users see each other.
    pub radius_km: f64,
    /// How long a presence survives without an update before the reaper
    /// removes it.
    pub presence_ttl: Duration,
    /// Window over which outbound location deltas are batched per viewer.
    pub coalesce_window: Duration,
    /// How long a new connection has to complete its initial snapshot.
    pub handshake_timeout: Duration,
    /// Close a connection after this long without any inbound traffic.
    pub heartbeat_timeout: Duration,
    /// Bounded capacity of each connection's outbound queue.
    pub channel_capacity: usize,
}

impl RadarConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            radius_km: env_parse("RADAR_RADIUS_KM", DEFAULT_RADIUS_KM),
            presence_ttl: Duration::from_secs(env_parse("RADAR_PRESENCE_TTL_SECS", DEFAULT_PRESENCE_TTL_SECS)),
            coalesce_window: Duration::from_millis(env_parse("RADAR_COALESCE_MS", DEFAULT_COALESCE_MS)),
            handshake_timeout: Duration::from_secs(env_parse(
                "RADAR_HANDSHAKE_TIMEOUT_SECS",
                DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            )),
            heartbeat_timeout: Duration::from_secs(env_parse(
                "RADAR_HEARTBEAT_TIMEOUT_SECS",
                DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            )),
            channel_capacity: env_parse("RADAR_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
