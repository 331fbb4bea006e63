use std::time::Duration;

use beat_core::BeatConfigSnapshot;

/// Retry and reconnection timing for profile resolution
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fetch attempts before settling for a degraded session
    pub max_attempts: u32,

    /// Fixed wait between a failed fetch and the next attempt
    pub retry_delay: Duration,

    /// Wait after an explicit reconnect before resolving again
    pub reconnect_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            reconnect_settle: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `session.*` keys, keeping defaults for anything missing
    pub fn from_snapshot(snapshot: &BeatConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: snapshot
                .get_u32("session.max_attempts")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_delay: snapshot
                .get_duration_ms("session.retry_delay_ms")
                .unwrap_or(defaults.retry_delay),
            reconnect_settle: snapshot
                .get_duration_ms("session.reconnect_settle_ms")
                .unwrap_or(defaults.reconnect_settle),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_reconnect_settle(mut self, delay: Duration) -> Self {
        self.reconnect_settle = delay;
        self
    }
}
