//! Remote API backend (OpenAI-compatible chat completions)
//!
//! Constructed only once a credential has been installed through /addKey or
//! the CLI; requests without a configured backend fail with Unauthorized.

use super::{ChatMessage, ChunkCallback, CompletionBackend, LlmError};
use crate::config::RemoteBackendConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct RemoteChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteChatResponse {
    choices: Vec<RemoteChoice>,
}

#[derive(Debug, Deserialize)]
struct RemoteChoice {
    message: Option<RemoteMessage>,
}

#[derive(Debug, Deserialize)]
struct RemoteMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct RemoteStreamChunk {
    choices: Vec<RemoteStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct RemoteStreamChoice {
    delta: Option<RemoteDelta>,
}

#[derive(Debug, Deserialize)]
struct RemoteDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Backend talking to a hosted chat-completions API with a bearer key
pub struct RemoteBackend {
    client: reqwest::Client,
    api_key: String,
    config: RemoteBackendConfig,
}

impl RemoteBackend {
    pub fn new(api_key: impl Into<String>, config: RemoteBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let request = RemoteChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            stream,
        };

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let response = self.send(messages, false).await?;

        let parsed: RemoteChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Network(format!("Failed to parse response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();

        Ok(content)
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        callback: ChunkCallback,
    ) -> Result<String, LlmError> {
        let response = self.send(messages, true).await?;

        // Process the SSE stream: "data: {json}" lines, "data: [DONE]" ends
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        loop {
            let next = match timeout(STREAM_CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(res)) => res,
                Ok(None) => break,
                Err(_) => {
                    return Err(LlmError::Network(format!(
                        "Stream timeout - no data from remote API for {} seconds",
                        STREAM_CHUNK_TIMEOUT.as_secs()
                    )));
                }
            };

            let bytes =
                next.map_err(|e| LlmError::Network(format!("Error reading stream: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim().to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    return Ok(accumulated);
                }

                if let Ok(chunk) = serde_json::from_str::<RemoteStreamChunk>(payload) {
                    let delta = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta)
                        .and_then(|d| d.content);
                    if let Some(text) = delta {
                        if !text.is_empty() {
                            accumulated.push_str(&text);
                            callback(text);
                        }
                    }
                }
            }
        }

        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_chunk_parsing() {
        let chunk: RemoteStreamChunk =
            serde_json::from_str(r#"{"choices": [{"delta": {"content": "Hi"}}]}"#).unwrap();
        let delta = chunk.choices.into_iter().next().unwrap().delta.unwrap();
        assert_eq!(delta.content.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_completions_url() {
        let backend = RemoteBackend::new("k", RemoteBackendConfig::default());
        assert_eq!(
            backend.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
