//! Query cache configuration.
//!
//! Controls the stale window applied when a caller does not pick one.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STALE_TIME_MS: u64 = 30_000;

/// Query cache configuration from `costboard.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Stale window (ms) used by observers without an explicit stale time.
    /// Zero disables the fresh-data short-circuit.
    pub default_stale_time_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_stale_time_ms: DEFAULT_STALE_TIME_MS,
        }
    }
}

impl From<&crate::config::QuerySettings> for QueryConfig {
    fn from(settings: &crate::config::QuerySettings) -> Self {
        Self {
            default_stale_time_ms: settings.default_stale_time_ms,
        }
    }
}

impl QueryConfig {
    /// Returns the default stale window, or `None` when disabled.
    pub fn default_stale_time(&self) -> Option<Duration> {
        (self.default_stale_time_ms > 0).then(|| Duration::from_millis(self.default_stale_time_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = QueryConfig::default();
        assert_eq!(config.default_stale_time_ms, 30_000);
        assert_eq!(config.default_stale_time(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_disables_stale_window() {
        let config = QueryConfig {
            default_stale_time_ms: 0,
        };
        assert_eq!(config.default_stale_time(), None);
    }
}
