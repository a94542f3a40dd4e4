//! Fire-and-forget HTTP request dispatch
//!
//! Each call runs on a detached worker task; outcomes are delivered back to
//! the owning task through an unbounded event channel, never by invoking
//! owner callbacks from the worker. The owner drains the channel on its own
//! turn, so dialogue state is only ever touched from one context.

use crate::config::ClientConfig;
use crate::server::stream::STREAM_SENTINEL;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Events delivered to the owning task
///
/// A one-shot request produces exactly one terminal event (`Success` or
/// `Failure`). A streaming request produces zero or more `Chunk` events in
/// production order, followed by exactly one terminal event (`StreamDone`
/// or `Failure`). No event is ever delivered for a request that was never
/// started.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    /// One-shot request completed; payload is the parsed JSON body, or
    /// `{"content": <raw text>}` when the body was not JSON
    Success(Value),
    /// Streamed text fragment, delivered in production order
    Chunk(String),
    /// End of a streamed response
    StreamDone,
    /// Terminal failure with a human-readable cause
    Failure(String),
}

/// Dispatch seam between the conversation controller and the HTTP client
///
/// Dispatch is fire-and-forget: results come back through the event channel
/// the implementation was constructed with.
pub trait RequestDispatcher: Send {
    fn post_one_shot(&self, url: &str, payload: Value);
    fn post_streaming(&self, url: &str, payload: Value);
}

/// HTTP client performing calls off the owning task
pub struct AsyncRequestClient {
    http: reqwest::Client,
    events: UnboundedSender<RequestEvent>,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl AsyncRequestClient {
    pub fn new(events: UnboundedSender<RequestEvent>, config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            events,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stream_timeout: Duration::from_secs(config.stream_timeout_secs),
        }
    }

    async fn execute_one_shot(
        http: reqwest::Client,
        url: String,
        payload: Value,
        timeout: Duration,
    ) -> RequestEvent {
        let response = match http
            .post(&url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return RequestEvent::Failure(format!("Request error: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return RequestEvent::Failure(format!("HTTP error: {}", status.as_u16()));
        }

        match response.text().await {
            Ok(body) => {
                // Non-JSON success bodies are recovered locally, not failed
                let payload = serde_json::from_str::<Value>(&body)
                    .unwrap_or_else(|_| json!({ "content": body }));
                RequestEvent::Success(payload)
            }
            Err(e) => RequestEvent::Failure(format!("Request error: {}", e)),
        }
    }

    async fn execute_streaming(
        http: reqwest::Client,
        url: String,
        payload: Value,
        timeout: Duration,
        events: UnboundedSender<RequestEvent>,
    ) {
        let response = match http
            .post(&url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let _ = events.send(RequestEvent::Failure(format!(
                    "Streaming request error: {} (payload: {})",
                    e, payload
                )));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let _ = events.send(RequestEvent::Failure(format!(
                "HTTP error: {}",
                status.as_u16()
            )));
            return;
        }

        let mut stream = response.bytes_stream();
        while let Some(next) = stream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = events.send(RequestEvent::Failure(format!(
                        "Streaming request error: {} (payload: {})",
                        e, payload
                    )));
                    return;
                }
            };

            let text = String::from_utf8_lossy(&bytes).to_string();
            // The endpoint stops at the sentinel without emitting it, but a
            // foreign server may leak it into the body; strip defensively.
            if let Some(idx) = text.find(STREAM_SENTINEL) {
                if idx > 0 {
                    let _ = events.send(RequestEvent::Chunk(text[..idx].to_string()));
                }
                let _ = events.send(RequestEvent::StreamDone);
                return;
            }
            if !text.is_empty() {
                let _ = events.send(RequestEvent::Chunk(text));
            }
        }

        let _ = events.send(RequestEvent::StreamDone);
    }
}

impl RequestDispatcher for AsyncRequestClient {
    /// Perform a single POST on a detached worker
    ///
    /// On 2xx the JSON body (or a raw-text fallback) is delivered as
    /// `Success`; non-2xx and transport failures become `Failure` events
    /// embedding the status or cause.
    fn post_one_shot(&self, url: &str, payload: Value) {
        let http = self.http.clone();
        let events = self.events.clone();
        let url = url.to_string();
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            tracing::debug!("POST {} (one-shot)", url);
            let event = Self::execute_one_shot(http, url, payload, timeout).await;
            let _ = events.send(event);
        });
    }

    /// Open a streaming POST on a detached worker
    ///
    /// Body chunks are forwarded in order as `Chunk` events; the stream end
    /// (or an observed sentinel) produces exactly one `StreamDone`.
    fn post_streaming(&self, url: &str, payload: Value) {
        let http = self.http.clone();
        let events = self.events.clone();
        let url = url.to_string();
        let timeout = self.stream_timeout;

        tokio::spawn(async move {
            tracing::debug!("POST {} (streaming)", url);
            Self::execute_streaming(http, url, payload, timeout, events).await;
        });
    }
}
