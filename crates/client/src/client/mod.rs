//! HTTP client for the slawatch admin API.
//!
//! Reads return raw JSON so they can be stored in the cache as-is. Writes
//! return [`RemoteCall`]s for the mutation executor; each carries the
//! correlation id of the write in the `X-Correlation-Id` header so the
//! server can echo it on the real-time channel.

pub mod conflicts;
pub mod events;
pub mod permissions;
pub mod roles;
pub mod teams;
pub mod tenants;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::engine::remote::{RemoteCall, RemoteError, Result};

/// Header carrying the correlation id of a write.
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// HTTP client for the slawatch API.
#[derive(Debug, Clone)]
pub struct SlawatchClient {
    client: reqwest::Client,
    base_url: String,
}

impl SlawatchClient {
    /// Create a new client with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment (SLAWATCH_URL or default).
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("SLAWATCH_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        Self::new(base_url)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and return the JSON body.
    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.client.get(self.url(path)).send().await?;
        handle_response(response).await
    }

    /// A write candidate sending `body` (if any) to `path`.
    fn write<B>(&self, method: reqwest::Method, path: &str, body: Option<B>) -> WriteRequest
    where
        B: Serialize,
    {
        WriteRequest {
            client: self.client.clone(),
            method,
            url: self.url(path),
            body: body.and_then(|b| serde_json::to_value(b).ok()),
        }
    }
}

/// A write request not yet sent.
#[derive(Debug, Clone)]
struct WriteRequest {
    client: reqwest::Client,
    method: reqwest::Method,
    url: String,
    body: Option<Value>,
}

impl WriteRequest {
    async fn send(self, correlation_id: Option<Uuid>) -> Result<Value> {
        let mut request = self.client.request(self.method, &self.url);
        if let Some(id) = correlation_id {
            request = request.header(CORRELATION_HEADER, id.to_string());
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }
        let response = request.send().await?;
        handle_response(response).await
    }

    /// Wraps this request as a single-candidate remote call.
    fn into_call(self, name: &str) -> RemoteCall {
        RemoteCall::new(name, move |correlation_id| self.send(correlation_id))
    }

    /// Appends this request to `call` as a fallback candidate.
    fn or_else_of(self, call: RemoteCall, name: &str) -> RemoteCall {
        call.or_else(name, move |correlation_id| self.send(correlation_id))
    }
}

/// Maps a response to its JSON body or a classified error.
///
/// An empty success body (e.g. `204 No Content`) yields `null`.
async fn handle_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    } else {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RemoteError::from_status(status.as_u16(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = SlawatchClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/api/teams"), "http://localhost:3000/api/teams");
    }

    #[test]
    fn test_write_request_serializes_body() {
        let client = SlawatchClient::new("http://localhost:3000");
        let request = client.write(
            reqwest::Method::PATCH,
            "/api/teams/7",
            Some(serde_json::json!({"isActive": false})),
        );

        assert_eq!(request.url, "http://localhost:3000/api/teams/7");
        assert_eq!(request.body, Some(serde_json::json!({"isActive": false})));
    }
}
