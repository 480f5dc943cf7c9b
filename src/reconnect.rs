//! Reconnection contract for radar clients.
//!
//! The server side of this contract is simple: every new connection gets a
//! full snapshot and supersedes any previous one for the same user, so a
//! client may reconnect as often as it likes. The client side is the policy
//! below — exponential backoff with a cap and jitter — plus the rule that
//! `request_radar` is the first message after reconnecting; no delta replay
//! is ever needed. The policy lives here so client binaries and tests share
//! one definition.

use std::time::Duration;

use rand::Rng;

use crate::config::env_parse;

const DEFAULT_BASE_MS: u64 = 1000;
const DEFAULT_MAX_MS: u64 = 30_000;
const DEFAULT_JITTER: f64 = 0.2;

/// Exponential backoff with a cap and symmetric jitter.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`: each delay is scaled by a uniform factor
    /// in `[1 - jitter, 1 + jitter]` so reconnecting clients spread out.
    pub jitter: f64,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self { base_delay, max_delay, jitter: jitter.clamp(0.0, 1.0) }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            Duration::from_millis(env_parse("RECONNECT_BASE_MS", DEFAULT_BASE_MS)),
            Duration::from_millis(env_parse("RECONNECT_MAX_MS", DEFAULT_MAX_MS)),
            env_parse("RECONNECT_JITTER", DEFAULT_JITTER),
        )
    }

    /// Delay before reconnect attempt `attempt` (zero-based):
    /// `min(base * 2^attempt, max)` with jitter applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter == 0.0 {
            return capped;
        }
        let scale = 1.0 + rand::rng().random_range(-self.jitter..=self.jitter);
        capped.mul_f64(scale.max(0.0))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_BASE_MS),
            Duration::from_millis(DEFAULT_MAX_MS),
            DEFAULT_JITTER,
        )
    }
}
