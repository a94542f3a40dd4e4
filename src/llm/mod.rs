//! Completion backend implementations
//!
//! Backends are external collaborators behind a single trait: a sequence of
//! chat messages in, generated text out, optionally chunked.

use crate::config::LlmConfig;
use serde::Serialize;
use std::sync::Arc;

mod error;
mod local;
mod remote;

#[cfg(feature = "test-sim")]
mod sim;
#[cfg(feature = "test-sim")]
pub use sim::SimBackend;

pub use error::LlmError;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;

/// A chat message in backend wire format
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Callback invoked for each generated chunk as it arrives
///
/// Implementations should be fast and non-blocking.
pub type ChunkCallback = Box<dyn Fn(String) + Send + Sync>;

/// Trait for completion backends
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Generate a completion for the given messages (non-streaming)
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Generate a completion, invoking the callback per chunk
    ///
    /// Default implementation falls back to non-streaming `complete()` and
    /// emits the whole response as a single chunk.
    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        callback: ChunkCallback,
    ) -> Result<String, LlmError> {
        let text = self.complete(messages).await?;
        callback(text.clone());
        Ok(text)
    }
}

/// Create a completion backend based on name
pub fn create_backend(name: &str, config: &LlmConfig) -> anyhow::Result<Arc<dyn CompletionBackend>> {
    match name.to_lowercase().as_str() {
        "local" | "ollama" => Ok(Arc::new(LocalBackend::new(config.local.clone()))),
        #[cfg(feature = "test-sim")]
        "sim" | "test" => Ok(Arc::new(SimBackend::new())),
        _ => anyhow::bail!("Unknown completion backend: {}. Supported: local, sim", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneShotOnly;

    #[async_trait]
    impl CompletionBackend for OneShotOnly {
        fn name(&self) -> &str {
            "one-shot-only"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok("whole response".to_string())
        }
    }

    #[tokio::test]
    async fn test_streaming_fallback_emits_single_chunk() {
        let backend = OneShotOnly;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let text = backend
            .complete_streaming(
                &[ChatMessage::user("hi")],
                Box::new(move |chunk| {
                    let _ = tx.send(chunk);
                }),
            )
            .await
            .unwrap();

        assert_eq!(text, "whole response");
        assert_eq!(rx.try_recv().unwrap(), "whole response");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_create_backend_unknown() {
        let config = LlmConfig::default();
        assert!(create_backend("nope", &config).is_err());
    }
}
