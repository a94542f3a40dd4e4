//! Typed errors for completion backends
//!
//! Provides structured error types so the HTTP layer can map failure modes
//! to status codes without string matching.

use thiserror::Error;

/// Completion backend errors with typed variants
#[derive(Debug, Error)]
pub enum LlmError {
    /// Authentication is missing, expired or invalid (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Network connectivity issue (connection refused, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Other errors not fitting the above categories
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Convert HTTP status code and error text into typed LlmError
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 => LlmError::Unauthorized(error_text),
            429 => LlmError::RateLimited(error_text),
            400 => LlmError::BadRequest(error_text),
            500..=599 => LlmError::ServiceError(error_text),
            _ => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert network/connection errors into typed LlmError
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            let error_text = e.to_string();
            Self::from_http_status(status, error_text)
        } else {
            LlmError::Other(e.into())
        }
    }

    /// Status code the inference endpoint reports this error as
    ///
    /// Backend failures during generation propagate to the caller as HTTP
    /// errors, which the request client turns into Failure events.
    pub fn status_code(&self) -> u16 {
        match self {
            LlmError::Unauthorized(_) => 401,
            LlmError::RateLimited(_) => 429,
            LlmError::BadRequest(_) => 400,
            LlmError::ServiceError(_) => 502,
            LlmError::Network(_) => 502,
            LlmError::Other(_) => 500,
        }
    }
}
