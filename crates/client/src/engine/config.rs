use std::{env, time::Duration};

use slawatch_core::cache::StalenessPolicy;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default freshness window in seconds (default: 30)
    pub stale_time_seconds: u64,
    /// Maximum number of cache entries (default: 5,000)
    pub cache_max_entries: usize,
    /// Settled correlation ids remembered for late echoes (default: 256)
    pub recent_correlations: usize,
    /// Minimum interval between reconnect attempts in ms (default: 2,000)
    pub reconnect_interval_ms: u64,
    /// Mark every cached key stale after a reconnection (default: true)
    pub invalidate_on_reconnect: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SLAWATCH_STALE_TIME_SECONDS` - Freshness window (default: 30)
    /// - `SLAWATCH_CACHE_MAX_ENTRIES` - Maximum cache entries (default: 5,000)
    /// - `SLAWATCH_RECENT_CORRELATIONS` - Remembered settled writes (default: 256)
    /// - `SLAWATCH_RECONNECT_INTERVAL_MS` - Reconnect throttle (default: 2,000)
    /// - `SLAWATCH_INVALIDATE_ON_RECONNECT` - Full refresh on reconnect (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::defaults();
        Self {
            stale_time_seconds: parse_var("SLAWATCH_STALE_TIME_SECONDS")
                .unwrap_or(defaults.stale_time_seconds),
            cache_max_entries: parse_var("SLAWATCH_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            recent_correlations: parse_var("SLAWATCH_RECENT_CORRELATIONS")
                .unwrap_or(defaults.recent_correlations),
            reconnect_interval_ms: parse_var("SLAWATCH_RECONNECT_INTERVAL_MS")
                .unwrap_or(defaults.reconnect_interval_ms),
            invalidate_on_reconnect: parse_var("SLAWATCH_INVALIDATE_ON_RECONNECT")
                .unwrap_or(defaults.invalidate_on_reconnect),
        }
    }

    /// Built-in values, ignoring the environment.
    pub fn defaults() -> Self {
        Self {
            stale_time_seconds: 30,
            cache_max_entries: 5_000,
            recent_correlations: 256,
            reconnect_interval_ms: 2_000,
            invalidate_on_reconnect: true,
        }
    }

    /// Get the default stale time as a Duration.
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_seconds)
    }

    /// Get the reconnect interval as a Duration.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.stale_time())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
