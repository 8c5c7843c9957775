//! Real-time synchronisation between sessions.
//!
//! Every write on the server is broadcast as a change notification. Other
//! sessions apply the same invalidation cascade the writer ran locally, so
//! all open consoles converge. Three filters run before a notification is
//! applied, in this order:
//!
//! - out-of-order delivery: a version not newer than the last one seen for
//!   the same entity is dropped;
//! - self-echo: a notification carrying a correlation id of one of this
//!   session's writes is dropped (the write already patched the store);
//! - scope: a change outside the tenant/team currently viewed is dropped.
//!
//! Versions are recorded before the echo and scope filters, so a dropped
//! notification still orders later ones.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use uuid::Uuid;

use slawatch_core::cache::{KeyPart, KeyPredicate};
use slawatch_core::invalidation::{EntityType, Operation};
use slawatch_core::notification::{parse_notification, ChangeNotification, ViewContext};

use super::config::EngineConfig;
use super::correlation::CorrelationRegistry;
use super::invalidation::InvalidationResolver;
use super::store::CacheStore;

/// Capacity of the outcome broadcast channel.
const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// Errors raised by a notification source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Raw notification payloads as they arrive on the channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, RealtimeError>> + Send>>;

/// Transport delivering change notifications.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Opens a new connection. The stream ends when the connection is lost.
    async fn connect(&self) -> Result<MessageStream, RealtimeError>;
}

/// State of the real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The invalidation cascade ran.
    Applied {
        entity: EntityType,
        operation: Operation,
        invalidated: usize,
    },
    /// The change originated from this session.
    SelfEcho { correlation_id: Uuid },
    /// A newer version of the entity was already seen.
    Stale { version: u64, last_seen: u64 },
    /// The change is outside the viewed tenant/team.
    ScopeMismatch,
    /// The payload could not be decoded.
    Malformed(String),
}

/// Limits reconnect attempts to one per interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectThrottle {
    interval: Duration,
    last_attempt: Option<Instant>,
}

impl ReconnectThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    /// How long to wait at `now` before the next attempt may start.
    pub fn delay_before_next(&self, now: Instant) -> Duration {
        match self.last_attempt {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }
}

type VersionKey = (EntityType, Option<KeyPart>);

/// Applies remote changes to one session's store.
pub struct RealtimeSync {
    store: CacheStore,
    resolver: InvalidationResolver,
    correlations: CorrelationRegistry,
    view: RwLock<ViewContext>,
    versions: Mutex<HashMap<VersionKey, u64>>,
    state: watch::Sender<ConnectionState>,
    outcomes: broadcast::Sender<SyncOutcome>,
    reconnect_interval: Duration,
    invalidate_on_reconnect: bool,
}

impl std::fmt::Debug for RealtimeSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSync")
            .field("state", &*self.state.borrow())
            .field("reconnect_interval", &self.reconnect_interval)
            .field("invalidate_on_reconnect", &self.invalidate_on_reconnect)
            .finish()
    }
}

impl RealtimeSync {
    pub fn new(
        store: CacheStore,
        resolver: InvalidationResolver,
        correlations: CorrelationRegistry,
        config: &EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            store,
            resolver,
            correlations,
            view: RwLock::new(ViewContext::all()),
            versions: Mutex::new(HashMap::new()),
            state,
            outcomes,
            reconnect_interval: config.reconnect_interval(),
            invalidate_on_reconnect: config.invalidate_on_reconnect,
        }
    }

    /// Sets the tenant/team context the session is displaying.
    pub fn set_view(&self, view: ViewContext) {
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view;
    }

    pub fn view(&self) -> ViewContext {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Observes the outcome of every handled message.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SyncOutcome> {
        self.outcomes.subscribe()
    }

    fn versions(&self) -> MutexGuard<'_, HashMap<VersionKey, u64>> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::debug!(from = ?*current, to = ?state, "Real-time connection state changed");
                *current = state;
                true
            }
        });
    }

    /// Decodes and handles one raw message.
    pub fn handle_message(&self, raw: &str) -> SyncOutcome {
        let outcome = match parse_notification(raw) {
            Ok(notification) => self.process(&notification),
            Err(e) => {
                tracing::warn!(error = %e, "Dropped malformed notification");
                SyncOutcome::Malformed(e.to_string())
            }
        };
        let _ = self.outcomes.send(outcome.clone());
        outcome
    }

    /// Handles one decoded notification.
    pub fn handle_notification(&self, notification: &ChangeNotification) -> SyncOutcome {
        let outcome = self.process(notification);
        let _ = self.outcomes.send(outcome.clone());
        outcome
    }

    fn process(&self, notification: &ChangeNotification) -> SyncOutcome {
        let entity = notification.entity_type;

        {
            let mut versions = self.versions();
            let key = notification.version_key();
            if let Some(&last_seen) = versions.get(&key) {
                if notification.version <= last_seen {
                    tracing::trace!(
                        %entity,
                        version = notification.version,
                        last_seen,
                        "Dropped out-of-order notification"
                    );
                    return SyncOutcome::Stale {
                        version: notification.version,
                        last_seen,
                    };
                }
            }
            versions.insert(key, notification.version);
        }

        if let Some(correlation_id) = notification.correlation_id {
            if self.correlations.is_own(&correlation_id) {
                tracing::debug!(%entity, %correlation_id, "Suppressed self-echo");
                return SyncOutcome::SelfEcho { correlation_id };
            }
        }

        if !self.view().admits(&notification.scope) {
            tracing::trace!(%entity, scope = ?notification.scope, "Dropped notification outside view");
            return SyncOutcome::ScopeMismatch;
        }

        let invalidated = self.resolver.invalidate_for(
            entity,
            notification.operation,
            &notification.mutation_scope(),
        );

        SyncOutcome::Applied {
            entity,
            operation: notification.operation,
            invalidated,
        }
    }

    /// Keeps a connection to `source` open until `shutdown` resolves,
    /// reconnecting at most once per reconnect interval.
    ///
    /// Losing the connection never touches cached values. After every
    /// reconnection all entries are marked stale (unless disabled), since
    /// changes made while disconnected were missed.
    pub async fn run<S, F>(&self, source: &S, shutdown: F)
    where
        S: NotificationSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut throttle = ReconnectThrottle::new(self.reconnect_interval);
        let mut connected_before = false;

        'session: loop {
            let delay = throttle.delay_before_next(Instant::now());
            if !delay.is_zero() {
                tokio::select! {
                    _ = &mut shutdown => break 'session,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            throttle.record_attempt(Instant::now());
            self.set_state(ConnectionState::Connecting);

            let connection = tokio::select! {
                _ = &mut shutdown => break 'session,
                connection = source.connect() => connection,
            };
            let mut stream = match connection {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Real-time connection failed");
                    self.set_state(ConnectionState::Disconnected);
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            if connected_before && self.invalidate_on_reconnect {
                let invalidated = self.store.invalidate(&KeyPredicate::All);
                tracing::info!(invalidated, "Reconnected, marked cached views stale");
            } else {
                tracing::info!("Real-time connection established");
            }
            connected_before = true;

            loop {
                tokio::select! {
                    _ = &mut shutdown => break 'session,
                    message = stream.next() => match message {
                        Some(Ok(raw)) => {
                            self.handle_message(&raw);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Real-time stream error");
                            break;
                        }
                        None => {
                            tracing::info!("Real-time stream ended");
                            break;
                        }
                    }
                }
            }

            self.set_state(ConnectionState::Disconnected);
        }

        self.set_state(ConnectionState::Disconnected);
    }
}
