//! Client-facing stream events.
//!
//! Serialized as `{"type": "<kind>", "data": {...}}`. A successful stream is
//! `metadata chunk* final complete`; a failed one ends with a single `error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SummarizeError;
use crate::ids::RequestId;
use crate::summary::SummaryReport;

/// Message carried by the `complete` event.
pub const STREAM_COMPLETED: &str = "Stream completed";

/// One event of a summarization stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Sample transcript announced by the test stream, ahead of `metadata`.
    Sample {
        /// The built-in transcript.
        sample_conversation: String,
        /// Progress note.
        message: String,
    },

    /// Processing started. Always the first event of a relay stream.
    Metadata {
        /// Identifier for log correlation.
        request_id: RequestId,
        /// When the request was accepted.
        started_at: DateTime<Utc>,
        /// Model the backend will use.
        model_used: String,
        /// Transcript length in characters.
        conversation_length: usize,
        /// Always `started`.
        status: String,
    },

    /// One backend fragment, relayed as produced.
    Chunk {
        /// Fragment text.
        chunk: String,
        /// Characters received so far, this fragment included.
        accumulated_length: usize,
        /// Always `false`; completion is signalled by `final`.
        done: bool,
    },

    /// The parsed result.
    Final(Box<SummaryReport>),

    /// Terminal marker after `final`.
    Complete {
        /// Always [`STREAM_COMPLETED`].
        message: String,
    },

    /// Terminal failure; replaces `final` and `complete`.
    Error {
        /// Human-readable failure.
        error: String,
        /// When the failure happened.
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    /// The opening event of a stream.
    #[must_use]
    pub fn metadata(request_id: RequestId, model_used: &str, conversation_length: usize) -> Self {
        Self::Metadata {
            request_id,
            started_at: Utc::now(),
            model_used: model_used.to_string(),
            conversation_length,
            status: "started".to_string(),
        }
    }

    /// A relayed fragment.
    #[must_use]
    pub const fn chunk(chunk: String, accumulated_length: usize) -> Self {
        Self::Chunk {
            chunk,
            accumulated_length,
            done: false,
        }
    }

    /// The closing event of a successful stream.
    #[must_use]
    pub fn complete() -> Self {
        Self::Complete {
            message: STREAM_COMPLETED.to_string(),
        }
    }

    /// A terminal error event.
    #[must_use]
    pub fn error(error: &SummarizeError) -> Self {
        Self::Error {
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// The sample announcement used by the test stream.
    #[must_use]
    pub fn sample(sample_conversation: &str) -> Self {
        Self::Sample {
            sample_conversation: sample_conversation.to_string(),
            message: "Starting analysis...".to_string(),
        }
    }

    /// No event may follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Wire tag of the event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sample { .. } => "sample",
            Self::Metadata { .. } => "metadata",
            Self::Chunk { .. } => "chunk",
            Self::Final(_) => "final",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_events_serialize_as_tagged_envelopes() {
        let chunk = serde_json::to_value(StreamEvent::chunk("Hea".to_string(), 3)).unwrap();
        assert_eq!(
            chunk,
            serde_json::json!({
                "type": "chunk",
                "data": {"chunk": "Hea", "accumulated_length": 3, "done": false}
            })
        );

        let complete = serde_json::to_value(StreamEvent::complete()).unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["data"]["message"], STREAM_COMPLETED);

        let metadata = serde_json::to_value(StreamEvent::metadata(RequestId::new(), "qwen3:8b", 12))
            .unwrap();
        assert_eq!(metadata["type"], "metadata");
        assert_eq!(metadata["data"]["status"], "started");
        assert_eq!(metadata["data"]["conversation_length"], 12);
    }

    #[test]
    fn test_error_event_carries_message_and_timestamp() {
        let event = StreamEvent::error(&SummarizeError::StreamTimeout(Duration::from_secs(300)));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert!(value["data"]["error"].as_str().unwrap().contains("300s"));
        assert!(value["data"]["timestamp"].is_string());
        assert!(event.is_terminal());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(StreamEvent::complete().is_terminal());
        assert!(!StreamEvent::chunk(String::new(), 0).is_terminal());
        assert!(!StreamEvent::sample("Nurse: Hi").is_terminal());
        assert_eq!(StreamEvent::sample("Nurse: Hi").kind(), "sample");
    }
}
