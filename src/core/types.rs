//! Dialogue and wire types shared by the client and the inference endpoint

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in the dialogue history
///
/// Ordering is significant: insertion order is conversational order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<Utc>,
}

impl DialogueMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Request body for POST /generate and POST /generateStream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub role: String,
    pub content: String,
    /// Snapshot of the embedding application's scene, injected as context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrml_scene: Option<String>,
    #[serde(default)]
    pub think: bool,
    /// Route the request to the remote API backend instead of the local model
    #[serde(default)]
    pub use_api: bool,
}

/// Response body for POST /generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
}

/// Request body for POST /setThink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetThinkRequest {
    pub think: bool,
}

/// Request body for POST /addKey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddKeyRequest {
    pub key: String,
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
}

/// Response body for GET /shutdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub status: String,
}
