//! In-memory cache store with LRU eviction and change subscriptions.
//!
//! The store is the single shared mutable resource of a console session.
//! Every operation is synchronous and runs under one short-lived lock, so
//! operations are atomic with respect to each other. Subscribers are called
//! after the lock is released but before the mutating call returns, in the
//! order the changes were made, which lets a callback read the store again.
//!
//! Refetches are tracked with fetch tickets: a ticket is issued when a fetch
//! starts and is only honoured on completion if nobody cancelled it in the
//! meantime (a mutation touching the key, or an invalidation).
//!
//! Optimistic writes are held as layers. Each entry keeps its confirmed
//! value (what the server last said) and serves that value with every held
//! patch re-applied on top, in the order the holds were taken. Releasing a
//! hold drops only its own layer; committing it folds the layer into the
//! confirmed value. A fetch that lands while a hold is open therefore never
//! hides the optimistic change.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use lru::LruCache;
use serde_json::Value;

use slawatch_core::cache::{CacheKey, EntryState, KeyPredicate};

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Value,
    pub fetched_at: Instant,
    pub state: EntryState,
}

/// A change observed by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The value under `key` was written.
    Set { key: CacheKey, state: EntryState },
    /// The entry was marked stale; its value is still served.
    Invalidated { key: CacheKey },
    /// A refetch of `key` started.
    Fetching { key: CacheKey },
    /// The entry was dropped (explicitly or by LRU eviction).
    Removed { key: CacheKey },
}

impl StoreEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            StoreEvent::Set { key, .. }
            | StoreEvent::Invalidated { key }
            | StoreEvent::Fetching { key }
            | StoreEvent::Removed { key } => key,
        }
    }
}

/// Callback registered with [`CacheStore::subscribe`].
pub type Subscriber = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Computes a layered value from the value below it. `None` leaves the
/// value as it is.
pub type Patch = Arc<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// Handle returned by [`CacheStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle returned by [`CacheStore::hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoldId(u64);

/// Proof that a fetch for `key` was started; see [`CacheStore::complete_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: CacheKey,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

struct Slot {
    /// What readers see: `base` with every hold on the key applied.
    entry: CacheEntry,
    /// Confirmed value. `None` for entries that only exist through a hold.
    base: Option<Value>,
}

struct Hold {
    id: HoldId,
    keys: Vec<CacheKey>,
    patch: Patch,
}

struct Inner {
    entries: LruCache<CacheKey, Slot>,
    /// Live fetch generation per key. Absent means no fetch may land.
    fetches: HashMap<CacheKey, u64>,
    next_generation: u64,
    /// Open holds, oldest first.
    holds: Vec<Hold>,
    next_hold: u64,
    subscribers: Vec<(SubscriptionId, CacheKey, Subscriber)>,
    next_subscription: u64,
}

impl Inner {
    /// Applies the holds on `key` to `base`, oldest first.
    fn layered(&self, key: &CacheKey, base: Option<Value>) -> Option<Value> {
        self.holds
            .iter()
            .filter(|hold| hold.keys.contains(key))
            .fold(base, |value, hold| (hold.patch)(value.as_ref()).or(value))
    }

    fn insert(&mut self, key: &CacheKey, slot: Slot, events: &mut Vec<StoreEvent>) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), slot) {
            if &evicted != key {
                tracing::trace!(key = %evicted, "Evicted least recently used cache entry");
                events.push(StoreEvent::Removed { key: evicted });
            }
        }
    }

    /// Writes a confirmed `value`, moving to `state` only if the transition
    /// is valid.
    fn write(&mut self, key: &CacheKey, value: Value, state: EntryState, events: &mut Vec<StoreEvent>) {
        let state = match self.entries.peek(key) {
            Some(existing) if !existing.entry.state.can_transition_to(state) => {
                tracing::warn!(
                    %key,
                    from = ?existing.entry.state,
                    to = ?state,
                    "Rejected invalid cache state transition"
                );
                existing.entry.state
            }
            _ => state,
        };

        let visible = self
            .layered(key, Some(value.clone()))
            .unwrap_or_else(|| value.clone());
        let slot = Slot {
            entry: CacheEntry {
                key: key.clone(),
                value: visible,
                fetched_at: Instant::now(),
                state,
            },
            base: Some(value),
        };
        self.insert(key, slot, events);
        events.push(StoreEvent::Set {
            key: key.clone(),
            state,
        });
    }

    /// Recomputes the served value of `key` after its holds changed.
    /// Returns true if the served value changed.
    fn rederive(&mut self, key: &CacheKey, events: &mut Vec<StoreEvent>) -> bool {
        let base = self.entries.peek(key).and_then(|slot| slot.base.clone());
        let Some(value) = self.layered(key, base) else {
            // Nothing confirmed and nothing held.
            if self.entries.pop(key).is_some() {
                events.push(StoreEvent::Removed { key: key.clone() });
                return true;
            }
            return false;
        };

        if let Some(slot) = self.entries.peek_mut(key) {
            if slot.entry.value == value {
                return false;
            }
            slot.entry.value = value;
            events.push(StoreEvent::Set {
                key: key.clone(),
                state: slot.entry.state,
            });
            return true;
        }

        // Never confirmed by the server.
        let slot = Slot {
            entry: CacheEntry {
                key: key.clone(),
                value,
                fetched_at: Instant::now(),
                state: EntryState::Stale,
            },
            base: None,
        };
        self.insert(key, slot, events);
        events.push(StoreEvent::Set {
            key: key.clone(),
            state: EntryState::Stale,
        });
        true
    }

    /// Drops the live ticket of `key`; an in-flight entry falls back to stale.
    fn cancel(&mut self, key: &CacheKey, events: &mut Vec<StoreEvent>) -> bool {
        let cancelled = self.fetches.remove(key).is_some();
        if let Some(slot) = self.entries.peek_mut(key) {
            if slot.entry.state.is_in_flight() {
                slot.entry.state = EntryState::Stale;
                events.push(StoreEvent::Invalidated { key: key.clone() });
            }
        }
        cancelled
    }
}

/// In-memory keyed store of query results.
///
/// Cheap to clone; clones share the same entries and subscribers.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CacheStore")
            .field("entries", &inner.entries.len())
            .field("fetches", &inner.fetches.len())
            .field("holds", &inner.holds.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl CacheStore {
    /// Creates a store holding at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(capacity),
                fetches: HashMap::new(),
                next_generation: 1,
                holds: Vec::new(),
                next_hold: 1,
                subscribers: Vec::new(),
                next_subscription: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every operation leaves `Inner` consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }

        let subscribers: Vec<(CacheKey, Subscriber)> = self
            .lock()
            .subscribers
            .iter()
            .map(|(_, key, callback)| (key.clone(), Arc::clone(callback)))
            .collect();

        for event in &events {
            for (key, callback) in &subscribers {
                if key.is_prefix_of(event.key()) {
                    callback(event);
                }
            }
        }
    }

    /// Returns a copy of the entry under `key`.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Returns a copy of the value under `key`.
    pub fn value(&self, key: &CacheKey) -> Option<Value> {
        self.get(key).map(|entry| entry.value)
    }

    /// Replaces or creates the entry under `key` and refreshes `fetched_at`.
    /// Held patches on `key` stay layered over the new value.
    ///
    /// An invalid state transition keeps the entry's current state; the value
    /// is written regardless.
    pub fn set(&self, key: &CacheKey, value: Value, state: EntryState) {
        let mut events = Vec::new();
        self.lock().write(key, value, state, &mut events);
        self.notify(events);
    }

    /// Atomically rewrites the confirmed value under `key` without changing
    /// its state.
    ///
    /// `f` receives the confirmed value (if any) and returns the new one, or
    /// `None` to leave the entry untouched. Held patches are re-applied on
    /// top of the result. A value created for an absent key starts out stale
    /// since the server never confirmed it. Returns true if a write happened.
    pub fn update<F>(&self, key: &CacheKey, f: F) -> bool
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let mut events = Vec::new();
        let written = {
            let mut inner = self.lock();
            let (current, state) = match inner.entries.peek(key) {
                Some(slot) => (slot.base.clone(), slot.entry.state),
                None => (None, EntryState::Stale),
            };
            match f(current.as_ref()) {
                Some(next) => {
                    inner.write(key, next, state, &mut events);
                    true
                }
                None => false,
            }
        };
        self.notify(events);
        written
    }

    /// Drops the entry under `key`, cancelling any fetch for it.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut events = Vec::new();
        let removed = {
            let mut inner = self.lock();
            inner.fetches.remove(key);
            inner.entries.pop(key).map(|slot| slot.entry)
        };
        if removed.is_some() {
            events.push(StoreEvent::Removed { key: key.clone() });
        }
        self.notify(events);
        removed
    }

    /// Marks every entry matched by `predicate` stale, keeping its value.
    ///
    /// Fetches already running for matched keys are cancelled: their result
    /// predates the change that caused the invalidation. Returns the number
    /// of entries that became stale.
    pub fn invalidate(&self, predicate: &KeyPredicate) -> usize {
        let mut events = Vec::new();
        let count = {
            let mut inner = self.lock();

            let fetching: Vec<CacheKey> = inner
                .fetches
                .keys()
                .filter(|key| predicate.matches(key))
                .cloned()
                .collect();
            for key in &fetching {
                inner.cancel(key, &mut events);
            }

            let fresh: Vec<CacheKey> = inner
                .entries
                .iter()
                .filter(|(key, slot)| slot.entry.state.is_fresh() && predicate.matches(key))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &fresh {
                if let Some(slot) = inner.entries.peek_mut(key) {
                    slot.entry.state = EntryState::Stale;
                    events.push(StoreEvent::Invalidated { key: key.clone() });
                }
            }

            events
                .iter()
                .filter(|e| matches!(e, StoreEvent::Invalidated { .. }))
                .count()
        };

        tracing::trace!(%predicate, count, "Invalidated cache entries");
        self.notify(events);
        count
    }

    /// Registers a fetch for `key` and moves its entry to in-flight.
    ///
    /// A fresh entry (one whose stale time ran out, or a forced refetch) is
    /// marked stale first, so subscribers see `Invalidated` before
    /// `Fetching`. Any earlier ticket for the same key is superseded.
    pub fn begin_fetch(&self, key: &CacheKey) -> FetchTicket {
        let mut events = Vec::new();
        let ticket = {
            let mut inner = self.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            inner.fetches.insert(key.clone(), generation);

            if let Some(slot) = inner.entries.peek_mut(key) {
                if slot.entry.state.is_fresh() {
                    slot.entry.state = EntryState::Stale;
                    events.push(StoreEvent::Invalidated { key: key.clone() });
                }
                slot.entry.state = EntryState::InFlight;
            }
            events.push(StoreEvent::Fetching { key: key.clone() });

            FetchTicket {
                key: key.clone(),
                generation,
            }
        };
        tracing::trace!(key = %ticket.key, generation = ticket.generation, "Fetch started");
        self.notify(events);
        ticket
    }

    /// Lands a fetch result as the confirmed value of its key. Held patches
    /// are re-applied on top of it.
    ///
    /// Returns false (and leaves the store untouched) if the ticket was
    /// cancelled or superseded.
    pub fn complete_fetch(&self, ticket: &FetchTicket, value: Value) -> bool {
        let mut events = Vec::new();
        let applied = {
            let mut inner = self.lock();
            if inner.fetches.get(&ticket.key) == Some(&ticket.generation) {
                inner.fetches.remove(&ticket.key);
                inner.write(&ticket.key, value, EntryState::Fresh, &mut events);
                true
            } else {
                false
            }
        };

        if applied {
            tracing::trace!(key = %ticket.key, "Fetch result stored");
        } else {
            tracing::debug!(key = %ticket.key, "Discarded result of cancelled fetch");
        }
        self.notify(events);
        applied
    }

    /// Records a failed fetch; the entry falls back to stale.
    pub fn fail_fetch(&self, ticket: &FetchTicket) {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            if inner.fetches.get(&ticket.key) == Some(&ticket.generation) {
                inner.cancel(&ticket.key, &mut events);
            }
        }
        self.notify(events);
    }

    /// Cancels the fetch running for `key`, if any. Its eventual result will
    /// be discarded. Returns true if a fetch was cancelled.
    pub fn cancel_fetch(&self, key: &CacheKey) -> bool {
        let mut events = Vec::new();
        let cancelled = self.lock().cancel(key, &mut events);
        if cancelled {
            tracing::debug!(%key, "Cancelled in-flight fetch");
        }
        self.notify(events);
        cancelled
    }

    /// Layers `patch` over the values of `keys` until the hold is released
    /// or committed.
    ///
    /// Returns the hold together with the keys whose served value changed.
    pub fn hold(&self, keys: &[CacheKey], patch: Patch) -> (HoldId, Vec<CacheKey>) {
        let mut events = Vec::new();
        let (id, changed) = {
            let mut inner = self.lock();
            let id = HoldId(inner.next_hold);
            inner.next_hold += 1;
            inner.holds.push(Hold {
                id,
                keys: keys.to_vec(),
                patch,
            });

            let changed: Vec<CacheKey> = keys
                .iter()
                .filter(|key| inner.rederive(key, &mut events))
                .cloned()
                .collect();
            (id, changed)
        };
        self.notify(events);
        (id, changed)
    }

    /// Drops a hold, leaving every other layer in place. Returns false if the
    /// hold was already gone.
    pub fn release(&self, id: HoldId) -> bool {
        let mut events = Vec::new();
        let released = {
            let mut inner = self.lock();
            match inner.holds.iter().position(|hold| hold.id == id) {
                Some(pos) => {
                    let hold = inner.holds.remove(pos);
                    for key in &hold.keys {
                        inner.rederive(key, &mut events);
                    }
                    true
                }
                None => false,
            }
        };
        self.notify(events);
        released
    }

    /// Folds a held patch into the confirmed values of its keys and drops the
    /// hold.
    ///
    /// `reconcile` receives each key with its confirmed value after the
    /// patch was applied, and returns the value to confirm. `Ok(None)` keeps
    /// the confirmed value as it was. Keys the patch does not apply to are
    /// skipped. If `reconcile` fails nothing is written and the hold stays
    /// open. Returns the number of keys confirmed.
    pub fn commit<E, F>(&self, id: HoldId, mut reconcile: F) -> Result<usize, E>
    where
        F: FnMut(&CacheKey, &Value) -> Result<Option<Value>, E>,
    {
        let mut events = Vec::new();
        let confirmed = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(pos) = inner.holds.iter().position(|hold| hold.id == id) else {
                return Ok(0);
            };

            let mut confirmed = Vec::new();
            {
                let hold = &inner.holds[pos];
                for key in &hold.keys {
                    let base = inner.entries.peek(key).and_then(|slot| slot.base.clone());
                    let Some(patched) = (hold.patch)(base.as_ref()) else {
                        continue;
                    };
                    if let Some(next) = reconcile(key, &patched)? {
                        confirmed.push((key.clone(), next));
                    }
                }
            }

            let hold = inner.holds.remove(pos);
            for (key, value) in &confirmed {
                match inner.entries.peek_mut(key) {
                    Some(slot) => slot.base = Some(value.clone()),
                    None => {
                        let slot = Slot {
                            entry: CacheEntry {
                                key: key.clone(),
                                value: value.clone(),
                                fetched_at: Instant::now(),
                                state: EntryState::Stale,
                            },
                            base: Some(value.clone()),
                        };
                        inner.insert(key, slot, &mut events);
                    }
                }
            }
            for key in &hold.keys {
                inner.rederive(key, &mut events);
            }
            confirmed.len()
        };
        self.notify(events);
        Ok(confirmed)
    }

    /// Number of open holds.
    pub fn held(&self) -> usize {
        self.lock().holds.len()
    }

    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.lock().fetches.contains_key(key)
    }

    /// Registers `callback` for changes to `key` and every key below it.
    pub fn subscribe<F>(&self, key: CacheKey, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.subscribers.push((id, key, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(existing, _, _)| *existing != id);
        inner.subscribers.len() != before
    }

    /// Keys currently cached, most recently used first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slawatch_core::cache::{
        dashboard_summary_key, team_key, teams_key, tenant_teams_key, tenants_filtered_key,
        tenants_key,
    };

    /// Default max entries for tests
    const TEST_MAX_ENTRIES: usize = 1000;

    fn recorder(store: &CacheStore, key: CacheKey) -> Arc<Mutex<Vec<StoreEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(key, move |event| sink.lock().unwrap().push(event.clone()));
        seen
    }

    #[test]
    fn test_set_and_get() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&tenants_key(), json!([{"id": 1}]), EntryState::Fresh);

        let entry = store.get(&tenants_key()).unwrap();
        assert_eq!(entry.value, json!([{"id": 1}]));
        assert_eq!(entry.state, EntryState::Fresh);
        assert_eq!(entry.key, tenants_key());
    }

    #[test]
    fn test_get_nonexistent() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        assert!(store.get(&team_key(1)).is_none());
    }

    #[test]
    fn test_set_refreshes_fetched_at() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&team_key(1), json!({"id": 1}), EntryState::Fresh);
        let first = store.get(&team_key(1)).unwrap().fetched_at;

        std::thread::sleep(std::time::Duration::from_millis(2));
        store.set(&team_key(1), json!({"id": 1}), EntryState::Fresh);
        assert!(store.get(&team_key(1)).unwrap().fetched_at > first);
    }

    #[test]
    fn test_invalidate_prefix_keeps_values() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&tenants_key(), json!([1]), EntryState::Fresh);
        store.set(&tenants_filtered_key("active"), json!([2]), EntryState::Fresh);
        store.set(&teams_key(), json!([3]), EntryState::Fresh);

        let count = store.invalidate(&KeyPredicate::prefix(tenants_key()));
        assert_eq!(count, 2);

        let all = store.get(&tenants_key()).unwrap();
        assert_eq!(all.state, EntryState::Stale);
        assert_eq!(all.value, json!([1]));
        assert_eq!(
            store.get(&tenants_filtered_key("active")).unwrap().state,
            EntryState::Stale
        );
        assert_eq!(store.get(&teams_key()).unwrap().state, EntryState::Fresh);
    }

    #[test]
    fn test_invalidate_already_stale_is_not_counted() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([]), EntryState::Fresh);

        assert_eq!(store.invalidate(&KeyPredicate::All), 1);
        assert_eq!(store.invalidate(&KeyPredicate::All), 0);
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Stale);
        store.set(&teams_key(), json!([2]), EntryState::Fresh);

        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.state, EntryState::Stale);
        assert_eq!(entry.value, json!([2]));
    }

    #[test]
    fn test_update_preserves_state() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);
        store.invalidate(&KeyPredicate::exact(teams_key()));

        let written = store.update(&teams_key(), |current| {
            let mut items = current?.as_array()?.clone();
            items.push(json!(2));
            Some(json!(items))
        });

        assert!(written);
        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.value, json!([1, 2]));
        assert_eq!(entry.state, EntryState::Stale);
    }

    #[test]
    fn test_update_returning_none_is_a_no_op() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        let seen = recorder(&store, teams_key());

        assert!(!store.update(&teams_key(), |_| None));
        assert!(store.get(&teams_key()).is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_subscribers_see_prefix_changes_in_order() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        let seen = recorder(&store, teams_key());

        store.set(&tenant_teams_key(42), json!([]), EntryState::Fresh);
        store.set(&dashboard_summary_key(), json!({}), EntryState::Fresh);
        store.invalidate(&KeyPredicate::prefix(teams_key()));
        store.remove(&tenant_teams_key(42));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                StoreEvent::Set {
                    key: tenant_teams_key(42),
                    state: EntryState::Fresh
                },
                StoreEvent::Invalidated {
                    key: tenant_teams_key(42)
                },
                StoreEvent::Removed {
                    key: tenant_teams_key(42)
                },
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(teams_key(), move |_| *sink.lock().unwrap() += 1);

        store.set(&teams_key(), json!([]), EntryState::Fresh);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set(&teams_key(), json!([1]), EntryState::Fresh);

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscriber_can_read_store() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let reader = store.clone();
        store.subscribe(teams_key(), move |event| {
            *sink.lock().unwrap() = reader.value(event.key());
        });

        store.set(&teams_key(), json!([7]), EntryState::Fresh);
        assert_eq!(*observed.lock().unwrap(), Some(json!([7])));
    }

    #[test]
    fn test_fetch_lifecycle() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);
        store.invalidate(&KeyPredicate::exact(teams_key()));

        let ticket = store.begin_fetch(&teams_key());
        assert_eq!(store.get(&teams_key()).unwrap().state, EntryState::InFlight);
        assert!(store.is_fetching(&teams_key()));

        assert!(store.complete_fetch(&ticket, json!([1, 2])));
        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.state, EntryState::Fresh);
        assert_eq!(entry.value, json!([1, 2]));
        assert!(!store.is_fetching(&teams_key()));
    }

    #[test]
    fn test_failed_fetch_falls_back_to_stale() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Stale);

        let ticket = store.begin_fetch(&teams_key());
        store.fail_fetch(&ticket);

        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.state, EntryState::Stale);
        assert_eq!(entry.value, json!([1]));
    }

    #[test]
    fn test_cancelled_fetch_result_is_discarded() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!(["old"]), EntryState::Stale);

        let ticket = store.begin_fetch(&teams_key());
        assert!(store.cancel_fetch(&teams_key()));
        store.update(&teams_key(), |_| Some(json!(["optimistic"])));

        assert!(!store.complete_fetch(&ticket, json!(["stale response"])));
        assert_eq!(store.value(&teams_key()), Some(json!(["optimistic"])));
        assert!(!store.cancel_fetch(&teams_key()));
    }

    #[test]
    fn test_superseded_ticket_is_discarded() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);

        let first = store.begin_fetch(&teams_key());
        let second = store.begin_fetch(&teams_key());

        assert!(store.complete_fetch(&second, json!(["second"])));
        assert!(!store.complete_fetch(&first, json!(["first"])));
        assert_eq!(store.value(&teams_key()), Some(json!(["second"])));
    }

    #[test]
    fn test_invalidate_cancels_running_fetch() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Stale);
        let ticket = store.begin_fetch(&teams_key());

        assert_eq!(store.invalidate(&KeyPredicate::prefix(teams_key())), 1);
        assert!(!store.complete_fetch(&ticket, json!([0])));
        assert_eq!(store.get(&teams_key()).unwrap().state, EntryState::Stale);
    }

    #[test]
    fn test_lru_eviction_notifies_subscribers() {
        let store = CacheStore::new(2);
        let seen = recorder(&store, team_key(1));

        store.set(&team_key(1), json!({}), EntryState::Fresh);
        store.set(&team_key(2), json!({}), EntryState::Fresh);
        store.set(&team_key(3), json!({}), EntryState::Fresh);

        assert!(store.get(&team_key(1)).is_none());
        assert_eq!(store.len(), 2);
        assert!(seen
            .lock()
            .unwrap()
            .contains(&StoreEvent::Removed { key: team_key(1) }));
    }

    fn push(item: Value) -> Patch {
        Arc::new(move |current: Option<&Value>| {
            let mut items = current?.as_array()?.clone();
            items.push(item.clone());
            Some(Value::Array(items))
        })
    }

    #[test]
    fn test_release_drops_only_its_own_layer() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);

        let (first, changed) = store.hold(&[teams_key(), team_key(7)], push(json!("a")));
        let (_second, _) = store.hold(&[teams_key()], push(json!("b")));
        assert_eq!(changed, vec![teams_key()]);
        assert_eq!(store.value(&teams_key()), Some(json!([1, "a", "b"])));

        assert!(store.release(first));
        assert!(!store.release(first));

        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.value, json!([1, "b"]));
        assert_eq!(entry.state, EntryState::Fresh);
        assert!(store.get(&team_key(7)).is_none());
        assert_eq!(store.held(), 1);
    }

    #[test]
    fn test_commit_confirms_reconciled_layer() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);
        let (first, _) = store.hold(&[teams_key()], push(json!("a")));
        let (second, _) = store.hold(&[teams_key()], push(json!("b")));

        let confirmed = store
            .commit(first, |_, patched| {
                let items: Vec<Value> = patched
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|item| if item == "a" { json!(2) } else { item.clone() })
                    .collect();
                Ok::<_, ()>(Some(Value::Array(items)))
            })
            .unwrap();
        assert_eq!(confirmed, 1);
        assert_eq!(store.value(&teams_key()), Some(json!([1, 2, "b"])));

        // Dropping the other layer leaves the confirmed write in place.
        store.release(second);
        assert_eq!(store.value(&teams_key()), Some(json!([1, 2])));
        assert_eq!(store.held(), 0);
    }

    #[test]
    fn test_failed_commit_keeps_hold_open() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);
        let (id, _) = store.hold(&[teams_key()], push(json!("a")));

        let result = store.commit(id, |_, _| Err("rejected"));

        assert_eq!(result, Err("rejected"));
        assert_eq!(store.value(&teams_key()), Some(json!([1, "a"])));
        assert_eq!(store.held(), 1);
    }

    #[test]
    fn test_fetch_landing_under_hold_keeps_layer() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Stale);
        let (id, _) = store.hold(&[teams_key()], push(json!("a")));

        let ticket = store.begin_fetch(&teams_key());
        assert!(store.complete_fetch(&ticket, json!([1, 2])));

        let entry = store.get(&teams_key()).unwrap();
        assert_eq!(entry.value, json!([1, 2, "a"]));
        assert_eq!(entry.state, EntryState::Fresh);

        store.release(id);
        assert_eq!(store.value(&teams_key()), Some(json!([1, 2])));
    }

    #[test]
    fn test_refetch_of_fresh_entry_passes_through_stale() {
        let store = CacheStore::new(TEST_MAX_ENTRIES);
        store.set(&teams_key(), json!([1]), EntryState::Fresh);
        let seen = recorder(&store, teams_key());

        let ticket = store.begin_fetch(&teams_key());
        store.complete_fetch(&ticket, json!([2]));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                StoreEvent::Invalidated { key: teams_key() },
                StoreEvent::Fetching { key: teams_key() },
                StoreEvent::Set {
                    key: teams_key(),
                    state: EntryState::Fresh
                },
            ]
        );
    }

    #[test]
    fn test_evicted_entry_with_live_ticket_is_recreated() {
        let store = CacheStore::new(1);
        let ticket = store.begin_fetch(&team_key(1));
        store.set(&team_key(1), json!({}), EntryState::InFlight);
        store.set(&team_key(2), json!({}), EntryState::Fresh);

        assert!(store.complete_fetch(&ticket, json!({"id": 1})));
        assert_eq!(store.value(&team_key(1)), Some(json!({"id": 1})));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = CacheStore::new(0);
        store.set(&team_key(1), json!({}), EntryState::Fresh);
        assert_eq!(store.len(), 1);
    }
}
