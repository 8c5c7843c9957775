//! Correlation ids of writes issued by this session.
//!
//! A correlation id is attached to every outbound write. While the write is
//! pending its id sits in the pending set; once it succeeds the id moves to a
//! bounded set of recently settled ids so echoes that arrive late are still
//! recognised. A write that failed is forgotten: the server may still have
//! committed it, and its echo must then reach the cache like anyone else's.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use uuid::Uuid;

use slawatch_core::reconcile::TempId;

struct Inner {
    /// Pending writes, with the placeholder each one holds (creates only).
    pending: HashMap<Uuid, Option<TempId>>,
    recent: LruCache<Uuid, ()>,
}

/// Registry of this session's in-flight and recently settled writes.
#[derive(Clone)]
pub struct CorrelationRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CorrelationRegistry")
            .field("pending", &inner.pending.len())
            .field("recent", &inner.recent.len())
            .finish()
    }
}

impl CorrelationRegistry {
    /// Creates a registry remembering up to `recent_capacity` settled ids.
    pub fn new(recent_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(recent_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: HashMap::new(),
                recent: LruCache::new(capacity),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new pending write and returns its correlation id.
    ///
    /// Fails with the conflicting placeholder if another pending write
    /// already holds `placeholder`.
    pub fn begin(&self, placeholder: Option<&TempId>) -> Result<Uuid, TempId> {
        let mut inner = self.lock();
        if let Some(temp_id) = placeholder {
            if inner
                .pending
                .values()
                .any(|held| held.as_ref() == Some(temp_id))
            {
                return Err(temp_id.clone());
            }
        }

        let id = Uuid::new_v4();
        inner.pending.insert(id, placeholder.cloned());
        Ok(id)
    }

    /// Moves a successful write to the recently settled set.
    pub fn settle(&self, id: Uuid) {
        let mut inner = self.lock();
        inner.pending.remove(&id);
        inner.recent.put(id, ());
    }

    /// Forgets a write that failed or was abandoned.
    pub fn abandon(&self, id: Uuid) {
        self.lock().pending.remove(&id);
    }

    /// Returns true if `id` belongs to a write of this session.
    pub fn is_own(&self, id: &Uuid) -> bool {
        let mut inner = self.lock();
        inner.pending.contains_key(id) || inner.recent.get(id).is_some()
    }

    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.lock().pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}
