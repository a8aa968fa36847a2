//! Error taxonomy for the summarization pipeline.
//!
//! Every variant is terminal for the request that produced it; nothing in the
//! pipeline retries internally.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced by the summarizer and the stream relay.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Empty or malformed request, rejected before any backend call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The text-generation backend could not be reached or failed mid-call.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] LlmError),

    /// The backend answered but nothing usable could be extracted.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    /// The client went away before the stream completed.
    #[error("stream aborted by client")]
    StreamAborted,

    /// The stream ran past the configured maximum duration.
    #[error("stream exceeded maximum duration of {0:?}")]
    StreamTimeout(Duration),
}

impl SummarizeError {
    /// HTTP status used for a non-streaming failure envelope.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MalformedModelOutput(_) => StatusCode::BAD_GATEWAY,
            Self::StreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // Nobody is listening; the status is only ever logged.
            Self::StreamAborted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::MalformedModelOutput(_) => "malformed_model_output",
            Self::StreamAborted => "stream_aborted",
            Self::StreamTimeout(_) => "stream_timeout",
        }
    }
}

/// Convenience result alias for pipeline operations.
pub type SummarizeResult<T> = Result<T, SummarizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SummarizeError::InvalidInput("empty".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SummarizeError::from(LlmError::StreamInterrupted).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SummarizeError::MalformedModelOutput("no json".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SummarizeError::StreamTimeout(Duration::from_secs(5)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_backend_error_message_is_preserved() {
        let err = SummarizeError::from(LlmError::HttpStatusNotOk(502));
        assert_eq!(err.kind(), "backend_unavailable");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_durations() {
        let err = SummarizeError::StreamTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "stream exceeded maximum duration of 250ms");
        let err = SummarizeError::StreamTimeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "stream exceeded maximum duration of 300s");
    }
}
