//! Freshness decisions for cached entries.
//!
//! This is part of the Functional Core: the caller supplies `now`, so the
//! policy never reads a clock.

use std::time::{Duration, Instant};

use super::entry::EntryState;
use super::keys::CacheKey;

/// Decides, per cache key, whether a stored entry can be served without a
/// refetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessPolicy {
    default_stale_time: Duration,
    /// Per-prefix overrides; the longest matching prefix wins.
    overrides: Vec<(CacheKey, Duration)>,
}

impl StalenessPolicy {
    /// Creates a policy where every entry stays fresh for `default_stale_time`.
    pub fn new(default_stale_time: Duration) -> Self {
        Self {
            default_stale_time,
            overrides: Vec::new(),
        }
    }

    /// Overrides the stale time for every key under `prefix`.
    #[must_use = "This method returns a new StalenessPolicy and does not modify self"]
    pub fn with_override(mut self, prefix: CacheKey, stale_time: Duration) -> Self {
        self.overrides.retain(|(existing, _)| existing != &prefix);
        self.overrides.push((prefix, stale_time));
        self
    }

    /// Returns the stale time that applies to `key`.
    pub fn stale_time_for(&self, key: &CacheKey) -> Duration {
        self.overrides
            .iter()
            .filter(|(prefix, _)| prefix.is_prefix_of(key))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, stale_time)| *stale_time)
            .unwrap_or(self.default_stale_time)
    }

    /// Returns true if an entry in `state`, fetched at `fetched_at`, may be
    /// served as-is at `now`.
    ///
    /// Only `Fresh` entries younger than the key's stale time qualify; stale
    /// and in-flight entries always need a (re)fetch decision by the caller.
    pub fn is_fresh(
        &self,
        key: &CacheKey,
        state: EntryState,
        fetched_at: Instant,
        now: Instant,
    ) -> bool {
        state.is_fresh() && now.saturating_duration_since(fetched_at) < self.stale_time_for(key)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
