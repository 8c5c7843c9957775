//! Client error types.

use thiserror::Error;

use slawatch_core::cache::SerializationError;

use crate::engine::{MutationError, RealtimeError, RemoteError};

/// Result type alias for console operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during console operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] SerializationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
