//! Domain error types
//!
//! These errors represent business logic failures, distinct from
//! infrastructure errors. Using thiserror for ergonomic error handling with
//! proper Display implementations.

use thiserror::Error;

/// Errors related to dialogue state management
#[derive(Debug, Error)]
pub enum ConversationError {
    /// A terminal event arrived while no response was pending
    #[error("No response pending")]
    NoPendingResponse,

    /// The last dialogue entry is not the expected assistant placeholder
    #[error("Dialogue corrupted: expected pending assistant entry, found {found}")]
    PlaceholderMissing { found: String },
}

/// Errors related to inference server process supervision
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The child process could not be launched
    #[error("Failed to spawn inference server: {0}")]
    Spawn(#[source] std::io::Error),

    /// The child exited before answering a readiness probe
    #[error("Inference server exited before becoming ready ({status})")]
    ExitedBeforeReady { status: String },

    /// Readiness probing exhausted its deadline
    #[error("Inference server not ready after {0} seconds")]
    ReadyTimeout(u64),

    /// Waiting on the child process failed
    #[error("Failed to wait on inference server: {0}")]
    Wait(#[source] std::io::Error),

    /// The forced kill could not be issued
    #[error("Failed to kill inference server: {0}")]
    Kill(#[source] std::io::Error),

    /// The child survived the full termination cascade
    #[error("Inference server still running after forced kill")]
    KillTimeout,
}
