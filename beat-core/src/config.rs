//! # Configuration
//!
//! A minimal string key/value store. Components read typed values from a
//! [`BeatConfigSnapshot`] and fall back to their own defaults for anything
//! that is missing or unparsable.
//!
//! ```rust
//! use beat_core::BeatConfig;
//! let mut config = BeatConfig::new();
//!
//! config.set("session.retry_delay_ms", "2000");
//! config.set("upload.max_bytes", "52428800");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get_u64("upload.max_bytes"), Some(52_428_800));
//! ```
//!
//! ## Environment overrides
//!
//! [`BeatConfig::load_env`] maps prefixed variables onto dotted keys:
//!
//! ```bash
//! export BEAT__SESSION__RETRY_DELAY_MS=500   # session.retry_delay_ms
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct BeatConfig {
    values: HashMap<String, String>,
}

impl BeatConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Import every `{prefix}A__B` variable as key `a.b`
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    /// Same as [`load_env`](Self::load_env) over an explicit variable list
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped
                    .trim_start_matches('_')
                    .to_lowercase()
                    .replace("__", ".");
                if !normalized.is_empty() {
                    self.values.insert(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> BeatConfigSnapshot {
        BeatConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BeatConfigSnapshot {
    map: HashMap<String, String>,
}

impl BeatConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Read a millisecond count as a [`Duration`]
    pub fn get_duration_ms(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_variables_become_dotted_keys() {
        let mut config = BeatConfig::new();
        config.load_vars(
            "BEAT__",
            vec![
                ("BEAT__SESSION__RETRY_DELAY_MS".to_string(), "250".to_string()),
                ("PATH".to_string(), "/usr/bin".to_string()),
            ],
        );

        let snapshot = config.snapshot();
        assert_eq!(
            snapshot.get_duration_ms("session.retry_delay_ms"),
            Some(Duration::from_millis(250))
        );
        assert!(!config.has("path"));
    }

    #[test]
    fn test_unparsable_values_read_as_missing() {
        let mut config = BeatConfig::new();
        config.set("upload.max_bytes", "lots");
        assert_eq!(config.snapshot().get_u64("upload.max_bytes"), None);
    }
}
