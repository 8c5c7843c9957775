//! Invalidation cascades.
//!
//! After a write settles, every cached view it may have made wrong is marked
//! stale. Which views those are comes from the rule table.

use std::sync::Arc;

use slawatch_core::cache::KeyPredicate;
use slawatch_core::invalidation::{EntityType, MutationScope, Operation, RuleTable};

use super::store::CacheStore;

/// Applies invalidation cascades to a store.
///
/// Resolution is a pure lookup in the [`RuleTable`]; this type only adds the
/// side effect of marking the resulting keys stale.
#[derive(Debug, Clone)]
pub struct InvalidationResolver {
    rules: Arc<RuleTable>,
    store: CacheStore,
}

impl InvalidationResolver {
    pub fn new(store: CacheStore, rules: RuleTable) -> Self {
        Self {
            rules: Arc::new(rules),
            store,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Returns the predicates that `operation` on `entity` invalidates.
    pub fn resolve(
        &self,
        entity: EntityType,
        operation: Operation,
        scope: &MutationScope,
    ) -> Vec<KeyPredicate> {
        self.rules.resolve(entity, operation, scope)
    }

    /// Marks every key matched by `predicates` stale. Returns the number of
    /// entries that became stale.
    pub fn apply(&self, predicates: &[KeyPredicate]) -> usize {
        predicates
            .iter()
            .map(|predicate| self.store.invalidate(predicate))
            .sum()
    }

    /// Resolves and applies the cascade of one change.
    pub fn invalidate_for(
        &self,
        entity: EntityType,
        operation: Operation,
        scope: &MutationScope,
    ) -> usize {
        let predicates = self.resolve(entity, operation, scope);
        let count = self.apply(&predicates);
        tracing::debug!(
            %entity,
            ?operation,
            predicates = predicates.len(),
            invalidated = count,
            "Applied invalidation cascade"
        );
        count
    }
}
