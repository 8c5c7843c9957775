use std::sync::Arc;

use slawatch_core::invalidation::RuleTable;
use slawatch_core::reconcile::{TempId, TempIdGenerator};

use super::config::EngineConfig;
use super::correlation::CorrelationRegistry;
use super::invalidation::InvalidationResolver;
use super::mutation::MutationExecutor;
use super::query::QueryClient;
use super::realtime::RealtimeSync;
use super::store::CacheStore;

/// One console session: a store and everything that reads or writes it.
///
/// Built fresh when a session starts and dropped with it; nothing is
/// persisted.
#[derive(Debug, Clone)]
pub struct ConsoleSession {
    store: CacheStore,
    queries: QueryClient,
    executor: MutationExecutor,
    resolver: InvalidationResolver,
    realtime: Arc<RealtimeSync>,
    temp_ids: Arc<TempIdGenerator>,
}

impl ConsoleSession {
    /// Creates a session with the canonical invalidation table.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_rules(config, RuleTable::canonical())
    }

    pub fn with_rules(config: &EngineConfig, rules: RuleTable) -> Self {
        let store = CacheStore::new(config.cache_max_entries);
        let correlations = CorrelationRegistry::new(config.recent_correlations);
        let resolver = InvalidationResolver::new(store.clone(), rules);

        let queries = QueryClient::new(store.clone(), config.staleness_policy());
        let executor =
            MutationExecutor::new(store.clone(), resolver.clone(), correlations.clone());
        let realtime = RealtimeSync::new(store.clone(), resolver.clone(), correlations, config);

        Self {
            store,
            queries,
            executor,
            resolver,
            realtime: Arc::new(realtime),
            temp_ids: Arc::new(TempIdGenerator::from_clock()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn executor(&self) -> &MutationExecutor {
        &self.executor
    }

    pub fn resolver(&self) -> &InvalidationResolver {
        &self.resolver
    }

    /// Shared handle to the real-time synchroniser, for spawning its loop.
    pub fn realtime(&self) -> Arc<RealtimeSync> {
        Arc::clone(&self.realtime)
    }

    /// Issues a temporary id for a new optimistic record.
    pub fn next_temp_id(&self) -> TempId {
        self.temp_ids.next_id()
    }
}
