//! Local model backend (Ollama-style chat API)

#![allow(dead_code)]

use super::{ChatMessage, ChunkCallback, CompletionBackend, LlmError};
use crate::config::LocalBackendConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

/// Abort a stream when no bytes arrive for this long
const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct LocalChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    message: Option<LocalChatMessage>,
}

#[derive(Debug, Deserialize)]
struct LocalChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct LocalStreamChunk {
    message: Option<LocalChatMessage>,
    #[serde(default)]
    done: bool,
}

/// Backend talking to a local model server over its chat API
pub struct LocalBackend {
    client: reqwest::Client,
    config: LocalBackendConfig,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Check if the local model server is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = LocalChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        let parsed: LocalChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Network(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        callback: ChunkCallback,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = LocalChatRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, error_text));
        }

        // Process the newline-delimited JSON stream
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        loop {
            let next = match timeout(STREAM_CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(res)) => res,
                Ok(None) => break,
                Err(_) => {
                    return Err(LlmError::Network(format!(
                        "Stream timeout - no data from local model for {} seconds",
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

                if line.is_empty() {
                    continue;
                }

                if let Ok(chunk) = serde_json::from_str::<LocalStreamChunk>(&line) {
                    if let Some(message) = chunk.message {
                        if !message.content.is_empty() {
                            accumulated.push_str(&message.content);
                            callback(message.content);
                        }
                    }
                    if chunk.done {
                        return Ok(accumulated);
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
    fn test_stream_chunk_parsing() {
        let chunk: LocalStreamChunk =
            serde_json::from_str(r#"{"message": {"content": "Hel"}, "done": false}"#).unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hel");
        assert!(!chunk.done);

        let done: LocalStreamChunk = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(done.done);
        assert!(done.message.is_none());
    }
}
