//! The cache consistency engine.
//!
//! [`CacheStore`] holds query results; [`QueryClient`] reads through it,
//! [`MutationExecutor`] writes through it optimistically, and
//! [`RealtimeSync`] keeps it consistent with changes made by other sessions.
//! [`ConsoleSession`] wires one of each together.

pub mod config;
pub mod correlation;
pub mod invalidation;
pub mod mutation;
pub mod query;
pub mod realtime;
pub mod remote;
pub mod session;
pub mod store;

pub use config::EngineConfig;
pub use correlation::CorrelationRegistry;
pub use invalidation::InvalidationResolver;
pub use mutation::{
    Create, Delete, Mutation, MutationError, MutationExecutor, PendingMutation, Settled, Target,
    Update,
};
pub use query::QueryClient;
pub use realtime::{
    ConnectionState, MessageStream, NotificationSource, RealtimeError, RealtimeSync,
    ReconnectThrottle, SyncOutcome,
};
pub use remote::{FailureClass, RemoteCall, RemoteError};
pub use session::ConsoleSession;
pub use store::{
    CacheEntry, CacheStore, FetchTicket, HoldId, Patch, StoreEvent, SubscriptionId,
};
