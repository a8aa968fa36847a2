//! Error types for the text-generation backend.

use thiserror::Error;

/// Errors produced while talking to a text-generation backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed (connection refused, reset, timeout).
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Backend answered with a non-success status.
    #[error("backend http status not ok: {0}")]
    HttpStatusNotOk(u16),

    /// Backend response body could not be decoded.
    #[error("backend response malformed: {0}")]
    MalformedResponse(String),

    /// Backend reported an error inside the response stream.
    #[error("backend reported error: {0}")]
    Backend(String),

    /// The fragment stream ended before the backend signalled completion.
    #[error("backend stream ended before completion")]
    StreamInterrupted,

    /// Invalid backend URL.
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
