//! slawatch_core - the functional core of the console cache consistency engine.
//!
//! Everything here is pure data and pure functions: cache keys and
//! predicates, entry states, the staleness policy, the invalidation rule
//! table, record reconciliation and change notifications. The imperative
//! shell lives in `slawatch_client`.

pub mod cache;
pub mod invalidation;
pub mod models;
pub mod notification;
pub mod reconcile;
