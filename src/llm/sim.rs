//! Deterministic simulation backend for tests
//!
//! Echoes the user question back so callers can assert end-to-end behavior
//! without a model runtime. Streaming splits the reply into word chunks
//! with small delays so chunked delivery paths are actually exercised.

use super::{ChatMessage, ChunkCallback, CompletionBackend, LlmError};
use async_trait::async_trait;
use std::time::Duration;

pub struct SimBackend {
    reply_prefix: String,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            reply_prefix: "sim:".to_string(),
        }
    }

    /// The question is the tail of the assembled prompt; echo it so tests
    /// can observe prompt assembly (context, scene, think suffix) end to end.
    fn reply_for(&self, messages: &[ChatMessage]) -> String {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| {
                m.content
                    .rsplit_once("User question: ")
                    .map(|(_, tail)| tail)
                    .unwrap_or(m.content.as_str())
            })
            .unwrap_or("");

        format!("{} {}", self.reply_prefix, question.trim())
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(self.reply_for(messages))
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        callback: ChunkCallback,
    ) -> Result<String, LlmError> {
        let reply = self.reply_for(messages);
        for word in reply.split_inclusive(' ') {
            callback(word.to_string());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_echoes_question_tail() {
        let backend = SimBackend::new();
        let messages = vec![ChatMessage::user(
            "Context documents:\n...\n\nUser question: What is 3D Slicer? /no_think",
        )];
        let reply = backend.complete(&messages).await.unwrap();
        assert_eq!(reply, "sim: What is 3D Slicer? /no_think");
    }

    #[tokio::test]
    async fn test_streaming_chunks_concatenate_to_reply() {
        let backend = SimBackend::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reply = backend
            .complete_streaming(
                &[ChatMessage::user("User question: hello")],
                Box::new(move |chunk| {
                    let _ = tx.send(chunk);
                }),
            )
            .await
            .unwrap();

        let mut collected = String::new();
        while let Ok(chunk) = rx.try_recv() {
            collected.push_str(&chunk);
        }
        assert_eq!(collected, reply);
        assert_eq!(reply, "sim: hello");
    }
}
