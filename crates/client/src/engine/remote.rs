//! Remote calls made by mutations.
//!
//! A write may have more than one way to reach the server (for example a
//! `PATCH` endpoint with a `PUT` fallback on older backends). [`RemoteCall`]
//! holds those candidates in order and tries them in sequence, classifying
//! each failure before deciding whether the next candidate may run.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a remote call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Endpoint not found")]
    NotFound,

    #[error("Endpoint does not support this operation ({status})")]
    Unsupported { status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// What a failure means for the remaining candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The endpoint is absent on this server; another candidate may work.
    TryNext,
    /// The server saw the request (or might have); stop here.
    Abort,
}

impl RemoteError {
    /// Maps an HTTP error status to a remote error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => RemoteError::NotFound,
            405 | 501 => RemoteError::Unsupported { status },
            _ => RemoteError::Server {
                status,
                message: message.into(),
            },
        }
    }

    /// Only failures proving the request was not handled allow a fallback;
    /// anything else could duplicate a non-idempotent write.
    pub fn class(&self) -> FailureClass {
        match self {
            RemoteError::NotFound | RemoteError::Unsupported { .. } => FailureClass::TryNext,
            RemoteError::Network(_)
            | RemoteError::Timeout
            | RemoteError::Server { .. }
            | RemoteError::InvalidResponse(_) => FailureClass::Abort,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            RemoteError::from_status(status.as_u16(), e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Result type for remote calls.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Future returned by a candidate.
pub type RemoteFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// One way of performing a write. Receives the correlation id to attach.
pub type Candidate = Box<dyn FnOnce(Option<Uuid>) -> RemoteFuture + Send>;

/// An ordered list of candidate calls for one write.
pub struct RemoteCall {
    candidates: Vec<(String, Candidate)>,
}

impl std::fmt::Debug for RemoteCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCall")
            .field(
                "candidates",
                &self.candidates.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RemoteCall {
    /// A call with a single candidate.
    pub fn new<F, Fut>(name: impl Into<String>, call: F) -> Self
    where
        F: FnOnce(Option<Uuid>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            candidates: Vec::new(),
        }
        .or_else(name, call)
    }

    /// Appends a fallback candidate.
    #[must_use = "This method returns a new RemoteCall and does not modify self"]
    pub fn or_else<F, Fut>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: FnOnce(Option<Uuid>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let candidate: Candidate = Box::new(move |correlation_id| Box::pin(call(correlation_id)));
        self.candidates.push((name.into(), candidate));
        self
    }

    /// A call that can never succeed; executing it yields `NoCandidates`.
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Tries each candidate in order.
    ///
    /// Returns the first success, or the first failure classified as
    /// [`FailureClass::Abort`], or the last failure once every candidate
    /// said [`FailureClass::TryNext`]. `None` means there was nothing to try.
    pub async fn run(self, correlation_id: Option<Uuid>) -> Option<Result<Value>> {
        let mut last = None;

        for (name, candidate) in self.candidates {
            match candidate(correlation_id).await {
                Ok(value) => return Some(Ok(value)),
                Err(e) => match e.class() {
                    FailureClass::TryNext => {
                        tracing::warn!(candidate = %name, error = %e, "Remote candidate unavailable, trying next");
                        last = Some(Err(e));
                    }
                    FailureClass::Abort => {
                        tracing::debug!(candidate = %name, error = %e, "Remote candidate failed");
                        return Some(Err(e));
                    }
                },
            }
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        result: Result<Value>,
    ) -> impl FnOnce(Option<Uuid>) -> std::future::Ready<Result<Value>> + Send + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(name);
            std::future::ready(result)
        }
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(RemoteError::NotFound.class(), FailureClass::TryNext);
        assert_eq!(
            RemoteError::Unsupported { status: 405 }.class(),
            FailureClass::TryNext
        );
        assert_eq!(RemoteError::Timeout.class(), FailureClass::Abort);
        assert_eq!(
            RemoteError::Network("reset".into()).class(),
            FailureClass::Abort
        );
        assert_eq!(
            RemoteError::from_status(500, "boom").class(),
            FailureClass::Abort
        );
    }

    #[test]
    fn test_from_status() {
        assert_eq!(RemoteError::from_status(404, ""), RemoteError::NotFound);
        assert_eq!(
            RemoteError::from_status(501, ""),
            RemoteError::Unsupported { status: 501 }
        );
        assert_eq!(
            RemoteError::from_status(409, "conflict"),
            RemoteError::Server {
                status: 409,
                message: "conflict".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let call = RemoteCall::new("patch", recording(&log, "patch", Ok(json!({"id": 7}))))
            .or_else("put", recording(&log, "put", Ok(json!({"id": 8}))));

        assert_eq!(call.run(None).await, Some(Ok(json!({"id": 7}))));
        assert_eq!(*log.lock().unwrap(), vec!["patch"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_missing_endpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let call = RemoteCall::new("patch", recording(&log, "patch", Err(RemoteError::NotFound)))
            .or_else("put", recording(&log, "put", Ok(json!({"id": 7}))));

        assert_eq!(call.run(None).await, Some(Ok(json!({"id": 7}))));
        assert_eq!(*log.lock().unwrap(), vec!["patch", "put"]);
    }

    #[tokio::test]
    async fn test_aborts_on_server_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let call = RemoteCall::new("patch", recording(&log, "patch", Err(RemoteError::Timeout)))
            .or_else("put", recording(&log, "put", Ok(json!({"id": 7}))));

        assert_eq!(call.run(None).await, Some(Err(RemoteError::Timeout)));
        assert_eq!(*log.lock().unwrap(), vec!["patch"]);
    }

    #[tokio::test]
    async fn test_all_candidates_missing_returns_last_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let call = RemoteCall::new("patch", recording(&log, "patch", Err(RemoteError::NotFound)))
            .or_else(
                "put",
                recording(&log, "put", Err(RemoteError::Unsupported { status: 405 })),
            );

        assert_eq!(
            call.run(None).await,
            Some(Err(RemoteError::Unsupported { status: 405 }))
        );
    }

    #[tokio::test]
    async fn test_empty_call() {
        let call = RemoteCall::empty();
        assert!(call.is_empty());
        assert_eq!(call.run(None).await, None);
    }

    #[tokio::test]
    async fn test_candidate_receives_correlation_id() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let id = Uuid::new_v4();
        let call = RemoteCall::new("post", move |correlation_id| {
            *sink.lock().unwrap() = correlation_id;
            async { Ok(json!({})) }
        });

        call.run(Some(id)).await;
        assert_eq!(*seen.lock().unwrap(), Some(id));
    }
}
