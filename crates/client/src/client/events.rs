//! Server-Sent Events transport for change notifications.
//!
//! - `parse_sse_message` - Pure function to parse SSE text format
//! - `SseNotificationSource` - Streams the SSE endpoint for `RealtimeSync`

use async_trait::async_trait;

use slawatch_core::cache::KeyPart;

use super::SlawatchClient;
use crate::engine::realtime::{MessageStream, NotificationSource, RealtimeError};

/// A parsed SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event type; empty when the server sent none.
    pub event_type: String,
    /// Payload, with multi-line `data:` fields joined by `\n`.
    pub data: String,
    pub id: Option<String>,
}

/// Parse a single SSE message from the front of `buffer`.
///
/// SSE format:
/// ```text
/// event: change
/// data: {"entityType": "team", "operation": "update", "version": 3}
/// id: 3
///
/// ```
///
/// Returns `Some((message, remaining_buffer))` if a complete message was
/// parsed, or `None` if the buffer doesn't contain a complete message yet.
pub fn parse_sse_message(buffer: &str) -> Option<(SseMessage, String)> {
    let normalized;
    let buffer = if buffer.contains('\r') {
        normalized = buffer.replace("\r\n", "\n");
        normalized.as_str()
    } else {
        buffer
    };

    // SSE messages are terminated by double newline
    let end_pos = buffer.find("\n\n")?;

    let message_text = &buffer[..end_pos];
    let remaining = buffer[end_pos + 2..].to_string();

    let mut event_type = String::new();
    let mut data: Vec<&str> = Vec::new();
    let mut id = None;

    for line in message_text.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_type = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("id:") {
            id = Some(value.trim().to_string());
        }
        // Ignore comments (lines starting with ':') and unknown fields
    }

    Some((
        SseMessage {
            event_type,
            data: data.join("\n"),
            id,
        },
        remaining,
    ))
}

/// Real-time notifications streamed from `/api/events`.
#[derive(Debug, Clone)]
pub struct SseNotificationSource {
    client: SlawatchClient,
    tenant_id: Option<KeyPart>,
}

impl SseNotificationSource {
    pub fn new(client: SlawatchClient) -> Self {
        Self {
            client,
            tenant_id: None,
        }
    }

    /// Ask the server to only send changes of one tenant.
    pub fn for_tenant(mut self, tenant_id: KeyPart) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    fn events_url(&self) -> String {
        match &self.tenant_id {
            Some(tenant_id) => self
                .client
                .url(&format!("/api/events?tenant_id={}", tenant_id)),
            None => self.client.url("/api/events"),
        }
    }
}

#[async_trait]
impl NotificationSource for SseNotificationSource {
    async fn connect(&self) -> Result<MessageStream, RealtimeError> {
        let url = self.events_url();
        tracing::debug!(%url, "Connecting to event stream");

        let response = self
            .client
            .client
            .get(&url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RealtimeError::Connect(format!(
                "Event stream returned {}",
                response.status()
            )));
        }

        let stream = async_stream::stream! {
            use tokio_stream::StreamExt;

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));

                        while let Some((message, remaining)) = parse_sse_message(&buffer) {
                            buffer = remaining;

                            // Heartbeats carry no data
                            if !message.data.is_empty() {
                                yield Ok(message.data);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(RealtimeError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
