//! Conversation controller - dialogue history and request lifecycle
//!
//! Owns the ordered dialogue, the in-flight placeholder entry, and the
//! single-request gate. Results arrive as [`RequestEvent`]s drained by the
//! owning task; workers never mutate dialogue state directly.

use crate::client::{RequestDispatcher, RequestEvent};
use crate::core::errors::ConversationError;
use crate::core::traits::SceneProvider;
use crate::core::types::{DialogueMessage, Role};
use crate::render;
use serde_json::json;
use std::sync::Arc;

/// Provisional assistant entry shown while a response is pending
pub const PLACEHOLDER_TEXT: &str = "Generating response...";

/// Prefix of the assistant entry substituted on request failure
pub const SERVER_ERROR_PREFIX: &str = "Erreur de communication avec le serveur: ";

/// Maintains dialogue history and the request/response lifecycle
///
/// At most one placeholder exists at a time: `awaiting_response` is true iff
/// a placeholder is present, and `submit` refuses new input while it is.
pub struct ConversationController {
    dialogue: Vec<DialogueMessage>,
    awaiting_response: bool,
    thinking_enabled: bool,
    use_remote_model: bool,
    streaming_enabled: bool,
    /// Whether the current stream has already overwritten the placeholder
    stream_started: bool,
    dispatcher: Box<dyn RequestDispatcher>,
    scene: Arc<dyn SceneProvider>,
    base_url: String,
}

impl ConversationController {
    pub fn new(
        dispatcher: Box<dyn RequestDispatcher>,
        base_url: impl Into<String>,
        scene: Arc<dyn SceneProvider>,
    ) -> Self {
        Self {
            dialogue: Vec::new(),
            awaiting_response: false,
            thinking_enabled: false,
            use_remote_model: false,
            streaming_enabled: false,
            stream_started: false,
            dispatcher,
            scene,
            base_url: base_url.into(),
        }
    }

    pub fn dialogue(&self) -> &[DialogueMessage] {
        &self.dialogue
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn thinking_enabled(&self) -> bool {
        self.thinking_enabled
    }

    pub fn set_thinking(&mut self, think: bool) {
        self.thinking_enabled = think;
    }

    pub fn use_remote_model(&self) -> bool {
        self.use_remote_model
    }

    pub fn set_remote_model(&mut self, use_api: bool) {
        self.use_remote_model = use_api;
    }

    pub fn streaming_enabled(&self) -> bool {
        self.streaming_enabled
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming_enabled = streaming;
    }

    /// Submit a user message and dispatch the request
    ///
    /// No-op (returns `None`) while a response is pending or when the input
    /// is blank. Otherwise appends the user message and the placeholder,
    /// raises the gate, dispatches, and returns the freshly rendered
    /// dialogue so the caller sees the placeholder immediately; the answer
    /// arrives later through the event channel.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        if self.awaiting_response || text.trim().is_empty() {
            return None;
        }

        self.dialogue.push(DialogueMessage::user(text));
        self.dialogue.push(DialogueMessage::assistant(PLACEHOLDER_TEXT));
        self.awaiting_response = true;
        self.stream_started = false;

        let scene = match self.scene.scene_as_text() {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to snapshot scene: {}", e);
                None
            }
        };

        let payload = json!({
            "role": "user",
            "content": text,
            "mrml_scene": scene,
            "think": self.thinking_enabled,
            "use_api": self.use_remote_model,
        });

        if self.streaming_enabled {
            let url = format!("{}/generateStream", self.base_url);
            self.dispatcher.post_streaming(&url, payload);
        } else {
            let url = format!("{}/generate", self.base_url);
            self.dispatcher.post_one_shot(&url, payload);
        }

        Some(self.render())
    }

    /// Apply a delivered request event and return the re-rendered dialogue
    pub fn on_event(&mut self, event: RequestEvent) -> Result<String, ConversationError> {
        match event {
            RequestEvent::Success(payload) => self.on_success(&payload),
            RequestEvent::Chunk(chunk) => self.on_chunk(&chunk),
            RequestEvent::StreamDone => self.on_stream_done(),
            RequestEvent::Failure(error) => self.on_failure(&error),
        }
    }

    /// Replace the placeholder with the returned content
    pub fn on_success(&mut self, payload: &serde_json::Value) -> Result<String, ConversationError> {
        let content = payload
            .get("content")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());

        self.finish_turn(Some(content))?;
        Ok(self.render())
    }

    /// Replace the placeholder with a visible error entry
    ///
    /// The gate is released even when the dialogue invariant is violated, so
    /// the user can always retry.
    pub fn on_failure(&mut self, error: &str) -> Result<String, ConversationError> {
        let text = format!("{}{}", SERVER_ERROR_PREFIX, error);
        self.finish_turn(Some(text))?;
        Ok(self.render())
    }

    /// Append a streamed chunk to the pending assistant entry
    ///
    /// The first chunk overwrites the placeholder text; later chunks append
    /// in delivery order.
    pub fn on_chunk(&mut self, chunk: &str) -> Result<String, ConversationError> {
        if !self.awaiting_response {
            return Err(ConversationError::NoPendingResponse);
        }
        let stream_started = self.stream_started;
        let pending = self.pending_entry()?;
        if !stream_started {
            pending.content.clear();
        }
        pending.content.push_str(chunk);
        self.stream_started = true;
        Ok(self.render())
    }

    /// Finalize a streamed response and release the gate
    pub fn on_stream_done(&mut self) -> Result<String, ConversationError> {
        // A zero-chunk stream leaves the placeholder in place; clear it so
        // the dialogue never shows a stale "generating" entry.
        let replacement = if self.stream_started {
            None
        } else {
            Some(String::new())
        };
        self.finish_turn(replacement)?;
        Ok(self.render())
    }

    /// Render the dialogue to markup for display
    pub fn render(&self) -> String {
        render::render_dialogue(&self.dialogue)
    }

    /// Release the gate and, when given, replace the pending entry's content
    fn finish_turn(&mut self, replacement: Option<String>) -> Result<(), ConversationError> {
        let was_awaiting = self.awaiting_response;
        self.awaiting_response = false;
        self.stream_started = false;

        if !was_awaiting {
            return Err(ConversationError::NoPendingResponse);
        }
        if let Some(content) = replacement {
            let pending = self.pending_entry()?;
            pending.content = content;
        }
        Ok(())
    }

    /// The pending assistant entry, which must be the last message
    fn pending_entry(&mut self) -> Result<&mut DialogueMessage, ConversationError> {
        match self.dialogue.last_mut() {
            Some(msg) if msg.role == Role::Assistant => Ok(msg),
            Some(msg) => Err(ConversationError::PlaceholderMissing {
                found: msg.role.as_str().to_string(),
            }),
            None => Err(ConversationError::NoPendingResponse),
        }
    }
}
