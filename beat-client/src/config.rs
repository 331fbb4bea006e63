use std::time::Duration;

use beat_blob::BlobConfig;
use beat_core::{BeatConfig, BeatConfigSnapshot};
use beat_session::SessionConfig;

/// Environment prefix for configuration overrides (`BEAT__SESSION__MAX_ATTEMPTS`)
pub const ENV_PREFIX: &str = "BEAT";

/// Debounce settings for connectivity transitions
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Quiet window a new state must survive before it is acted on
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &BeatConfigSnapshot) -> Self {
        Self {
            debounce: snapshot
                .get_duration_ms("network.debounce_ms")
                .unwrap_or_else(|| Self::default().debounce),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Settings for every component the client wires together
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub blob: BlobConfig,
    pub monitor: MonitorConfig,
}

impl ClientConfig {
    pub fn from_snapshot(snapshot: &BeatConfigSnapshot) -> Self {
        Self {
            session: SessionConfig::from_snapshot(snapshot),
            blob: BlobConfig::from_snapshot(snapshot),
            monitor: MonitorConfig::from_snapshot(snapshot),
        }
    }

    /// Read `.env` (if present) and `BEAT__*` variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = BeatConfig::new();
        config.load_env(ENV_PREFIX);
        Self::from_snapshot(&config.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_every_component_section() {
        let mut config = BeatConfig::new();
        config.set("session.max_attempts", "5");
        config.set("upload.max_bytes", "1024");
        config.set("network.debounce_ms", "50");

        let client = ClientConfig::from_snapshot(&config.snapshot());
        assert_eq!(client.session.max_attempts, 5);
        assert_eq!(client.blob.max_upload_bytes, 1024);
        assert_eq!(client.monitor.debounce, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_keys_keep_defaults() {
        let client = ClientConfig::from_snapshot(&BeatConfig::new().snapshot());
        assert_eq!(client.session.max_attempts, 3);
        assert_eq!(client.blob.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(client.monitor.debounce, Duration::from_millis(500));
    }
}
