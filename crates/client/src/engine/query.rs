//! The read path.

use std::future::Future;
use std::time::Instant;

use serde_json::Value;

use slawatch_core::cache::{CacheKey, StalenessPolicy};

use super::remote::Result;
use super::store::CacheStore;

/// Serves cached views, refetching those the policy no longer considers
/// fresh.
#[derive(Debug, Clone)]
pub struct QueryClient {
    store: CacheStore,
    policy: StalenessPolicy,
}

impl QueryClient {
    pub fn new(store: CacheStore, policy: StalenessPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Returns true if `key` can be served from the store right now.
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.store.get(key).is_some_and(|entry| {
            self.policy
                .is_fresh(key, entry.state, entry.fetched_at, Instant::now())
        })
    }

    /// Returns the value of `key`, calling `fetch` if the cached entry is
    /// absent, stale or expired.
    ///
    /// If the fetch is cancelled while it runs (a mutation or invalidation
    /// touched the key) its result is discarded and the current cached value
    /// is returned instead. A result that lands under a pending mutation is
    /// returned with the mutation's optimistic patch applied. A failed fetch
    /// leaves the cached value in place and returns the error.
    pub async fn query<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(entry) = self.store.get(key) {
            if self
                .policy
                .is_fresh(key, entry.state, entry.fetched_at, Instant::now())
            {
                tracing::trace!(%key, "Cache hit");
                return Ok(entry.value);
            }
        }

        tracing::trace!(%key, "Cache miss, fetching");
        self.refetch(key, fetch).await
    }

    /// Fetches `key` unconditionally.
    pub async fn refetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let ticket = self.store.begin_fetch(key);

        match fetch().await {
            Ok(value) => {
                self.store.complete_fetch(&ticket, value.clone());
                Ok(self.store.value(key).unwrap_or(value))
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Fetch failed");
                self.store.fail_fetch(&ticket);
                Err(e)
            }
        }
    }
}
