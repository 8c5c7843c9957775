//! Optimistic writes.
//!
//! A [`Mutation`] is one create, update or delete. The executor holds its
//! optimistic patch as a layer in the store before the server is involved,
//! then either commits the layer reconciled with the server's answer and runs
//! the invalidation cascade, or releases the layer. Releasing undoes only
//! this mutation's change, so writes overlapping on the same keys settle
//! independently of each other.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use slawatch_core::cache::{
    serialize_record, CacheKey, KeyPart, KeyPredicate, SerializationError,
};
use slawatch_core::invalidation::{EntityType, MutationScope, Operation};
use slawatch_core::models::Record;
use slawatch_core::reconcile::{
    apply_changes, insert_placeholder, record_id, remove_record, replace_in_place,
    replace_record, ReconcileError, TempId,
};

use super::correlation::CorrelationRegistry;
use super::invalidation::InvalidationResolver;
use super::remote::{RemoteCall, RemoteError};
use super::store::{CacheStore, HoldId, Patch};

/// Errors surfaced by [`MutationExecutor::execute`].
///
/// Every error is returned after the optimistic patch was released.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MutationError {
    #[error("Remote call failed: {0}")]
    Network(#[from] RemoteError),

    #[error("Server response could not be reconciled: {0}")]
    Reconciliation(#[from] ReconcileError),

    #[error("Placeholder {0} is already held by a pending mutation")]
    DuplicatePlaceholder(TempId),

    #[error("Mutation has no remote call to make")]
    NoCandidates,
}

impl MutationError {
    /// Whether the caller may sensibly offer a retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MutationError::Network(_))
    }
}

/// Result type for mutations.
pub type Result<T> = std::result::Result<T, MutationError>;

/// Computes the optimistic value of one target key from its current value.
/// `None` leaves the key untouched.
pub type PatchFn = Patch;

/// Computes the reconciled value of one patched key from its current value
/// and the server's record. `Ok(None)` leaves the key untouched.
pub type ReconcileFn =
    Arc<dyn Fn(&Value, &Value) -> std::result::Result<Option<Value>, ReconcileError> + Send + Sync>;

/// What every mutation touches.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub entity: EntityType,
    pub scope: MutationScope,
    pub keys: Vec<CacheKey>,
}

impl Target {
    pub fn new(entity: EntityType, scope: MutationScope, keys: Vec<CacheKey>) -> Self {
        Self {
            entity,
            scope,
            keys,
        }
    }
}

/// Creates a record. The placeholder carries `temp_id` until reconciliation.
pub struct Create {
    pub target: Target,
    pub temp_id: TempId,
    pub placeholder: Value,
    pub remote: RemoteCall,
    optimistic: Option<PatchFn>,
    reconcile: Option<ReconcileFn>,
}

/// Changes fields of the record with `id`.
pub struct Update {
    pub target: Target,
    pub id: Value,
    pub changes: Value,
    pub remote: RemoteCall,
    optimistic: Option<PatchFn>,
    reconcile: Option<ReconcileFn>,
}

/// Removes the record with `id`.
pub struct Delete {
    pub target: Target,
    pub id: Value,
    pub remote: RemoteCall,
    optimistic: Option<PatchFn>,
}

/// One write issued by the UI.
pub enum Mutation {
    Create(Create),
    Update(Update),
    Delete(Delete),
}

impl std::fmt::Debug for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = self.target();
        f.debug_struct("Mutation")
            .field("operation", &self.operation())
            .field("entity", &target.entity)
            .field("keys", &target.keys)
            .finish()
    }
}

impl Mutation {
    pub fn create(target: Target, temp_id: TempId, placeholder: Value, remote: RemoteCall) -> Self {
        Mutation::Create(Create {
            target,
            temp_id,
            placeholder,
            remote,
            optimistic: None,
            reconcile: None,
        })
    }

    pub fn update(target: Target, id: Value, changes: Value, remote: RemoteCall) -> Self {
        Mutation::Update(Update {
            target,
            id,
            changes,
            remote,
            optimistic: None,
            reconcile: None,
        })
    }

    pub fn delete(target: Target, id: Value, remote: RemoteCall) -> Self {
        Mutation::Delete(Delete {
            target,
            id,
            remote,
            optimistic: None,
        })
    }

    /// Builds a create from a typed placeholder whose id is `temp_id`.
    pub fn create_record<R: Record>(
        placeholder: &R,
        temp_id: TempId,
        keys: Vec<CacheKey>,
        remote: RemoteCall,
    ) -> std::result::Result<Self, SerializationError> {
        let target = Target::new(R::ENTITY, placeholder.scope(), keys);
        Ok(Self::create(
            target,
            temp_id,
            serialize_record(placeholder)?,
            remote,
        ))
    }

    /// Builds an update of `record` with a partial `changes` object.
    pub fn update_record<R: Record>(
        record: &R,
        changes: Value,
        keys: Vec<CacheKey>,
        remote: RemoteCall,
    ) -> Self {
        let target = Target::new(R::ENTITY, record.scope(), keys);
        Self::update(target, record.id().to_json(), changes, remote)
    }

    pub fn delete_record<R: Record>(record: &R, keys: Vec<CacheKey>, remote: RemoteCall) -> Self {
        let target = Target::new(R::ENTITY, record.scope(), keys);
        Self::delete(target, record.id().to_json(), remote)
    }

    /// Replaces the default optimistic patch.
    #[must_use = "This method returns a new Mutation and does not modify self"]
    pub fn with_optimistic<F>(mut self, patch: F) -> Self
    where
        F: Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    {
        let patch: PatchFn = Arc::new(patch);
        match &mut self {
            Mutation::Create(m) => m.optimistic = Some(patch),
            Mutation::Update(m) => m.optimistic = Some(patch),
            Mutation::Delete(m) => m.optimistic = Some(patch),
        }
        self
    }

    /// Replaces the default reconciliation. Deletes have nothing to
    /// reconcile and ignore it.
    #[must_use = "This method returns a new Mutation and does not modify self"]
    pub fn with_reconcile<F>(mut self, reconcile: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Option<Value>, ReconcileError>
            + Send
            + Sync
            + 'static,
    {
        let reconcile: ReconcileFn = Arc::new(reconcile);
        match &mut self {
            Mutation::Create(m) => m.reconcile = Some(reconcile),
            Mutation::Update(m) => m.reconcile = Some(reconcile),
            Mutation::Delete(_) => {}
        }
        self
    }

    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Create(_) => Operation::Create,
            Mutation::Update(_) => Operation::Update,
            Mutation::Delete(_) => Operation::Delete,
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            Mutation::Create(m) => &m.target,
            Mutation::Update(m) => &m.target,
            Mutation::Delete(m) => &m.target,
        }
    }

    /// The placeholder this mutation holds, for creates.
    pub fn placeholder(&self) -> Option<&TempId> {
        match self {
            Mutation::Create(m) => Some(&m.temp_id),
            Mutation::Update(_) | Mutation::Delete(_) => None,
        }
    }

    fn optimistic_fn(&self) -> PatchFn {
        match self {
            Mutation::Create(m) => m.optimistic.clone().unwrap_or_else(|| {
                let placeholder = m.placeholder.clone();
                Arc::new(move |current: Option<&Value>| {
                    insert_placeholder(current, &placeholder)
                })
            }),
            Mutation::Update(m) => m.optimistic.clone().unwrap_or_else(|| {
                let (id, changes) = (m.id.clone(), m.changes.clone());
                Arc::new(move |current: Option<&Value>| apply_changes(current, &id, &changes))
            }),
            Mutation::Delete(m) => m.optimistic.clone().unwrap_or_else(|| {
                let id = m.id.clone();
                Arc::new(move |current: Option<&Value>| remove_record(current, &id))
            }),
        }
    }

    fn reconcile_fn(&self) -> Option<ReconcileFn> {
        match self {
            Mutation::Create(m) => Some(m.reconcile.clone().unwrap_or_else(|| {
                let temp_id = m.temp_id.to_json();
                Arc::new(move |current: &Value, server: &Value| {
                    replace_in_place(current, &temp_id, server).map(Some)
                })
            })),
            Mutation::Update(m) => Some(m.reconcile.clone().unwrap_or_else(|| {
                Arc::new(|current: &Value, server: &Value| {
                    Ok::<_, ReconcileError>(replace_record(current, server))
                })
            })),
            Mutation::Delete(_) => None,
        }
    }

    /// Applies this mutation's reconciliation for `server` to every target
    /// key present in `store`. Returns the number of keys rewritten.
    ///
    /// Running it again with the same record leaves the store unchanged.
    pub fn reconcile(
        &self,
        store: &CacheStore,
        server: &Value,
    ) -> std::result::Result<usize, ReconcileError> {
        match self.reconcile_fn() {
            Some(reconcile) => reconcile_keys(store, &self.target().keys, &reconcile, server),
            None => Ok(0),
        }
    }

    fn into_parts(self) -> (Plan, RemoteCall) {
        let optimistic = self.optimistic_fn();
        let reconcile = self.reconcile_fn();
        let operation = self.operation();
        let placeholder = self.placeholder().cloned();

        let (target, remote) = match self {
            Mutation::Create(m) => (m.target, m.remote),
            Mutation::Update(m) => (m.target, m.remote),
            Mutation::Delete(m) => (m.target, m.remote),
        };

        let plan = Plan {
            operation,
            target,
            placeholder,
            optimistic,
            reconcile,
        };
        (plan, remote)
    }
}

/// Everything about a mutation except its remote call.
struct Plan {
    operation: Operation,
    target: Target,
    placeholder: Option<TempId>,
    optimistic: PatchFn,
    reconcile: Option<ReconcileFn>,
}

fn reconcile_keys(
    store: &CacheStore,
    keys: &[CacheKey],
    reconcile: &ReconcileFn,
    server: &Value,
) -> std::result::Result<usize, ReconcileError> {
    let mut rewritten = 0;
    for key in keys {
        let mut failure = None;
        let written = store.update(key, |current| match reconcile(current?, server) {
            Ok(next) => next,
            Err(e) => {
                failure = Some(e);
                None
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        if written {
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

/// A successfully settled mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    /// The server's authoritative record.
    pub record: Value,
    pub correlation_id: Uuid,
    /// Number of entries marked stale by the invalidation cascade.
    pub invalidated: usize,
}

/// Runs mutations against one session's store.
#[derive(Debug, Clone)]
pub struct MutationExecutor {
    store: CacheStore,
    resolver: InvalidationResolver,
    correlations: CorrelationRegistry,
}

impl MutationExecutor {
    pub fn new(
        store: CacheStore,
        resolver: InvalidationResolver,
        correlations: CorrelationRegistry,
    ) -> Self {
        Self {
            store,
            resolver,
            correlations,
        }
    }

    pub fn correlations(&self) -> &CorrelationRegistry {
        &self.correlations
    }

    /// Performs one write: [`MutationExecutor::begin`] followed by
    /// [`PendingMutation::settle`]. There is no automatic retry.
    pub async fn execute(&self, mutation: Mutation) -> Result<Settled> {
        self.begin(mutation)?.settle().await
    }

    /// Applies the optimistic side of `mutation` synchronously.
    ///
    /// When this returns, every target key already shows the optimistic
    /// value and fetches running for them have been cancelled. Fetches
    /// started later land underneath the patch.
    pub fn begin(&self, mutation: Mutation) -> Result<PendingMutation> {
        let (plan, remote) = mutation.into_parts();

        let correlation_id = self
            .correlations
            .begin(plan.placeholder.as_ref())
            .map_err(MutationError::DuplicatePlaceholder)?;

        // Their result was read before the patch.
        for key in &plan.target.keys {
            self.store.cancel_fetch(key);
        }

        let (hold, patched) = self
            .store
            .hold(&plan.target.keys, Arc::clone(&plan.optimistic));

        tracing::debug!(
            entity = %plan.target.entity,
            operation = %plan.operation,
            %correlation_id,
            patched = patched.len(),
            "Applied optimistic patch"
        );

        Ok(PendingMutation {
            executor: self.clone(),
            plan,
            remote: Some(remote),
            patched,
            hold,
            correlation_id,
            settled: false,
        })
    }

    fn settle_success(
        &self,
        plan: &Plan,
        hold: HoldId,
        record: Value,
        correlation_id: Uuid,
    ) -> Result<Settled> {
        let entity = plan.target.entity;

        let mut unmatched = Vec::new();
        let committed = self.store.commit(hold, |key, patched| match &plan.reconcile {
            Some(reconcile) => match reconcile(patched, &record) {
                Err(ReconcileError::PlaceholderNotFound { temp_id }) => {
                    tracing::warn!(%key, %temp_id, "Placeholder missing, marking view stale");
                    unmatched.push(key.clone());
                    Ok(None)
                }
                other => other,
            },
            None => Ok(Some(patched.clone())),
        });

        if let Err(e) = committed {
            self.rollback(hold, correlation_id);
            tracing::error!(
                %entity,
                operation = %plan.operation,
                %correlation_id,
                error = %e,
                "Failed to reconcile server response, rolled back"
            );
            return Err(MutationError::Reconciliation(e));
        }
        self.correlations.settle(correlation_id);

        for key in unmatched {
            self.store.invalidate(&KeyPredicate::exact(key));
        }

        let mut scope = plan.target.scope.clone();
        if let Some(id) = record_id(&record).and_then(KeyPart::from_json) {
            scope.entity_id = Some(id);
        }
        let invalidated = self
            .resolver
            .invalidate_for(entity, plan.operation, &scope);

        tracing::debug!(%entity, operation = %plan.operation, %correlation_id, invalidated, "Mutation settled");

        Ok(Settled {
            record,
            correlation_id,
            invalidated,
        })
    }

    fn rollback(&self, hold: HoldId, correlation_id: Uuid) {
        self.store.release(hold);
        self.correlations.abandon(correlation_id);
    }
}

/// A mutation whose optimistic patch is applied and whose remote call has
/// not completed yet.
///
/// Dropping it without calling [`PendingMutation::settle`] rolls the patch
/// back.
pub struct PendingMutation {
    executor: MutationExecutor,
    plan: Plan,
    remote: Option<RemoteCall>,
    patched: Vec<CacheKey>,
    hold: HoldId,
    correlation_id: Uuid,
    settled: bool,
}

impl std::fmt::Debug for PendingMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMutation")
            .field("operation", &self.plan.operation)
            .field("entity", &self.plan.target.entity)
            .field("patched", &self.patched)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl PendingMutation {
    /// Id attached to the outbound write.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Keys that received the optimistic patch.
    pub fn patched_keys(&self) -> &[CacheKey] {
        &self.patched
    }

    /// Awaits the remote call, then reconciles or rolls back.
    pub async fn settle(mut self) -> Result<Settled> {
        let entity = self.plan.target.entity;
        let operation = self.plan.operation;
        let correlation_id = self.correlation_id;

        let outcome = match self.remote.take() {
            Some(remote) => remote.run(Some(correlation_id)).await,
            None => None,
        };

        let result = match outcome {
            Some(Ok(record)) => {
                self.executor
                    .settle_success(&self.plan, self.hold, record, correlation_id)
            }
            Some(Err(e)) => {
                self.executor.rollback(self.hold, correlation_id);
                tracing::warn!(%entity, %operation, %correlation_id, error = %e, "Mutation failed, rolled back");
                Err(MutationError::Network(e))
            }
            None => {
                self.executor.rollback(self.hold, correlation_id);
                tracing::warn!(%entity, %operation, %correlation_id, "Mutation had no remote call, rolled back");
                Err(MutationError::NoCandidates)
            }
        };

        self.settled = true;
        result
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        if !self.settled {
            self.executor.rollback(self.hold, self.correlation_id);
            tracing::debug!(correlation_id = %self.correlation_id, "Abandoned mutation rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slawatch_core::cache::{tenants_key, EntryState};
    use slawatch_core::invalidation::RuleTable;

    fn executor() -> (CacheStore, MutationExecutor) {
        let store = CacheStore::new(100);
        let resolver = InvalidationResolver::new(store.clone(), RuleTable::canonical());
        let executor = MutationExecutor::new(store.clone(), resolver, CorrelationRegistry::new(8));
        (store, executor)
    }

    fn create_acme(temp: &str, remote: RemoteCall) -> Mutation {
        Mutation::create(
            Target::new(EntityType::Tenant, MutationScope::new(), vec![tenants_key()]),
            TempId::new(temp),
            json!({"id": temp, "name": "Acme"}),
            remote,
        )
    }

    #[test]
    fn test_begin_applies_patch_synchronously() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([]), EntryState::Fresh);

        let pending = executor
            .begin(create_acme("T-1", RemoteCall::empty()))
            .unwrap();

        assert_eq!(pending.patched_keys(), &[tenants_key()]);
        assert_eq!(
            store.value(&tenants_key()),
            Some(json!([{"id": "T-1", "name": "Acme"}]))
        );
        assert!(executor.correlations().is_pending(&pending.correlation_id()));
    }

    #[test]
    fn test_dropping_pending_mutation_rolls_back() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([]), EntryState::Fresh);

        let pending = executor
            .begin(create_acme("T-1", RemoteCall::empty()))
            .unwrap();
        let id = pending.correlation_id();
        drop(pending);

        assert_eq!(store.value(&tenants_key()), Some(json!([])));
        assert!(!executor.correlations().is_pending(&id));
        assert!(!executor.correlations().is_own(&id));
    }

    #[test]
    fn test_duplicate_placeholder_is_rejected_without_patching() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([]), EntryState::Fresh);

        let _first = executor
            .begin(create_acme("T-1", RemoteCall::empty()))
            .unwrap();
        let second = executor.begin(
            create_acme("T-1", RemoteCall::empty())
                .with_optimistic(|_| Some(json!(["should not appear"]))),
        );

        assert_eq!(
            second.unwrap_err(),
            MutationError::DuplicatePlaceholder(TempId::new("T-1"))
        );
        assert_eq!(
            store.value(&tenants_key()),
            Some(json!([{"id": "T-1", "name": "Acme"}]))
        );
    }

    #[tokio::test]
    async fn test_no_candidates_rolls_back() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([]), EntryState::Fresh);

        let result = executor
            .execute(create_acme("T-1", RemoteCall::empty()))
            .await;

        assert_eq!(result, Err(MutationError::NoCandidates));
        assert_eq!(store.value(&tenants_key()), Some(json!([])));
    }

    #[tokio::test]
    async fn test_reconcile_failure_rolls_back() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([{"id": 1}]), EntryState::Fresh);

        let mutation = create_acme(
            "T-1",
            RemoteCall::new("post", |_| async { Ok(json!({"name": "no id"})) }),
        );
        let result = executor.execute(mutation).await;

        assert_eq!(
            result,
            Err(MutationError::Reconciliation(ReconcileError::MissingId))
        );
        assert!(!result.unwrap_err().is_recoverable());
        assert_eq!(store.value(&tenants_key()), Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn test_missing_placeholder_marks_view_stale() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([{"id": 1}]), EntryState::Fresh);

        // A patch that never inserts the placeholder.
        let remote = RemoteCall::new("post", |_| async { Ok(json!({"id": 42})) });
        let mutation = create_acme("T-1", remote).with_optimistic(|current| current.cloned());
        let settled = executor.execute(mutation).await.unwrap();

        assert_eq!(settled.record, json!({"id": 42}));
        let entry = store.get(&tenants_key()).unwrap();
        assert_eq!(entry.value, json!([{"id": 1}]));
        assert_eq!(entry.state, EntryState::Stale);
        assert!(executor.correlations().is_own(&settled.correlation_id));
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_invalidates() {
        let (store, executor) = executor();
        store.set(&tenants_key(), json!([{"id": 1}, {"id": 2}]), EntryState::Fresh);

        let mutation = Mutation::delete(
            Target::new(
                EntityType::Tenant,
                MutationScope::new().with_tenant(1).with_entity(1),
                vec![tenants_key()],
            ),
            json!(1),
            RemoteCall::new("delete", |_| async { Ok(json!({"id": 1})) }),
        );
        let settled = executor.execute(mutation).await.unwrap();

        let entry = store.get(&tenants_key()).unwrap();
        assert_eq!(entry.value, json!([{"id": 2}]));
        assert_eq!(entry.state, EntryState::Stale);
        assert!(settled.invalidated >= 1);
    }
}
