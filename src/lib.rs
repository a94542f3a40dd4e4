//! sgpt: embedded RAG chatbot assistant for a medical imaging workbench
//!
//! This library provides:
//! - Supervision of a local inference server process (start, readiness, shutdown)
//! - A fire-and-forget HTTP client delivering results through an event channel
//! - Conversation state management (history, placeholder, failure substitution)
//! - The inference HTTP endpoint wrapping retrieval + generation backends
//! - Markdown-subset rendering of the dialogue for an embedding view

pub mod client;
pub mod config;
pub mod core;
pub mod llm;
pub mod render;
pub mod retrieval;
pub mod server;
pub mod supervisor;

pub use crate::core::conversation::ConversationController;
pub use config::Config;
