//! Stream relay: turns a streaming summarization into ordered events.
//!
//! Each request gets its own task and bounded channel. The task stops pulling
//! fragments as soon as the receiver is dropped, and dropping the fragment
//! stream cancels the backend generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::events::StreamEvent;
use crate::error::{SummarizeError, SummarizeResult};
use crate::ids::RequestId;
use crate::summary::{ConversationInput, Summarizer, SummaryReport};

/// Default number of events buffered per stream.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Relays a [`Summarizer`] stream as [`StreamEvent`]s.
#[derive(Clone)]
pub struct StreamRelay {
    summarizer: Arc<Summarizer>,
    max_duration: Duration,
    buffer: usize,
}

impl StreamRelay {
    /// Create a relay whose streams are cut off after `max_duration`.
    #[must_use]
    pub const fn new(summarizer: Arc<Summarizer>, max_duration: Duration) -> Self {
        Self {
            summarizer,
            max_duration,
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Set the per-stream event buffer (at least one event).
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start relaying a summarization.
    ///
    /// The `metadata` event is already queued when this returns, before the
    /// backend has been contacted. Must be called within a Tokio runtime.
    pub fn start(&self, input: ConversationInput) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let request_id = RequestId::new();

        let metadata =
            StreamEvent::metadata(request_id, self.summarizer.model_name(), input.char_len());
        if tx.try_send(metadata).is_err() {
            // A fresh channel always has room; nothing to relay otherwise.
            return rx;
        }

        let summarizer = Arc::clone(&self.summarizer);
        let max_duration = self.max_duration;
        tokio::spawn(async move {
            relay(summarizer, input, tx, max_duration, request_id).await;
        });

        rx
    }
}

async fn relay(
    summarizer: Arc<Summarizer>,
    input: ConversationInput,
    tx: mpsc::Sender<StreamEvent>,
    max_duration: Duration,
    request_id: RequestId,
) {
    let outcome = tokio::select! {
        () = tx.closed() => Err(SummarizeError::StreamAborted),
        result = tokio::time::timeout(max_duration, pump(&summarizer, &input, &tx)) => {
            result.unwrap_or_else(|_| Err(SummarizeError::StreamTimeout(max_duration)))
        }
    };

    match outcome {
        Ok(report) => {
            let delivered = tx.send(StreamEvent::Final(Box::new(report))).await.is_ok()
                && tx.send(StreamEvent::complete()).await.is_ok();
            if delivered {
                info!(%request_id, "Stream completed");
            } else {
                info!(%request_id, "Client disconnected before the result was delivered");
            }
        }
        Err(SummarizeError::StreamAborted) => {
            info!(%request_id, "Client disconnected; backend stream released");
        }
        Err(e) => {
            warn!(%request_id, kind = e.kind(), "Stream failed: {e}");
            // The client may already be gone; nothing else to do then.
            let _ = tx.send(StreamEvent::error(&e)).await;
        }
    }
}

/// Forward fragments until the backend finishes, then parse.
async fn pump(
    summarizer: &Arc<Summarizer>,
    input: &ConversationInput,
    tx: &mpsc::Sender<StreamEvent>,
) -> SummarizeResult<SummaryReport> {
    let mut stream = summarizer.stream(input).await?;

    while let Some(fragment) = stream.next_fragment().await {
        let event = StreamEvent::chunk(fragment?, stream.accumulated_len());
        tx.send(event)
            .await
            .map_err(|_| SummarizeError::StreamAborted)?;
    }

    stream.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::Failure;
    use crate::llm::{ScriptedGenerator, TextGenerator};
    use crate::summary::test_support::MODEL_OUTPUT;
    use regex::Regex;

    fn relay_for(generator: &Arc<ScriptedGenerator>, max_duration: Duration) -> StreamRelay {
        let generator: Arc<dyn TextGenerator> = generator.clone();
        let summarizer = Arc::new(Summarizer::new(generator).unwrap());
        StreamRelay::new(summarizer, max_duration)
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[StreamEvent]) -> String {
        events
            .iter()
            .map(StreamEvent::kind)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn input() -> ConversationInput {
        ConversationInput::new(
            "Nurse: How are you? Patient: I have a headache since this morning, pain level 6/10.",
        )
    }

    #[tokio::test]
    async fn test_successful_stream_is_ordered() {
        let generator = Arc::new(ScriptedGenerator::new(MODEL_OUTPUT));
        let relay = relay_for(&generator, Duration::from_secs(5));
        let events = collect(relay.start(input())).await;

        let order = Regex::new(r"^metadata( chunk)* final complete$").unwrap();
        assert!(order.is_match(&kinds(&events)), "got {}", kinds(&events));

        let lengths: Vec<usize> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Chunk { accumulated_length, .. } => Some(*accumulated_length),
                _ => None,
            })
            .collect();
        assert!(lengths.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(lengths.last().copied(), Some(MODEL_OUTPUT.chars().count()));

        let relayed: String = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Chunk { chunk, .. } => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(relayed, MODEL_OUTPUT);

        let Some(StreamEvent::Final(report)) = events.iter().rev().nth(1) else {
            panic!("missing final event");
        };
        assert!(report.summary.summary.contains("cough"));
        assert!(!generator.was_cancelled());
    }

    #[tokio::test]
    async fn test_completed_stream_does_not_cancel_backend() {
        let generator = Arc::new(
            ScriptedGenerator::new("ignored").with_fragments(["{\"summary\": ", "\"Cough.\"}"]),
        );
        let events = collect(relay_for(&generator, Duration::from_secs(5)).start(input())).await;

        assert_eq!(kinds(&events), "metadata chunk chunk final complete");
        assert_eq!(generator.calls(), 1);
        assert!(!generator.was_cancelled());
    }

    #[tokio::test]
    async fn test_metadata_is_queued_before_backend_answers() {
        let generator = Arc::new(
            ScriptedGenerator::new(MODEL_OUTPUT).with_fragment_delay(Duration::from_millis(50)),
        );
        let relay = relay_for(&generator, Duration::from_secs(5));
        let mut rx = relay.start(input());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind(), "metadata");
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_backend() {
        let fragments: Vec<String> = (0..10).map(|i| format!("part {i} ")).collect();
        let generator = Arc::new(
            ScriptedGenerator::new("ignored")
                .with_fragments(fragments)
                .with_fragment_delay(Duration::from_millis(25)),
        );
        let relay = relay_for(&generator, Duration::from_secs(5)).with_buffer(1);
        let mut rx = relay.start(input());

        assert_eq!(rx.recv().await.unwrap().kind(), "metadata");
        assert_eq!(rx.recv().await.unwrap().kind(), "chunk");
        assert_eq!(rx.recv().await.unwrap().kind(), "chunk");
        drop(rx);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !generator.was_cancelled() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(generator.was_cancelled());
    }

    #[tokio::test]
    async fn test_backend_disconnect_ends_with_error() {
        let generator = Arc::new(
            ScriptedGenerator::new("ignored")
                .with_fragments(["{\"summary\": ", "\"Cough\"", "}"])
                .with_failure(Failure::DisconnectAfter(2)),
        );
        let events = collect(relay_for(&generator, Duration::from_secs(5)).start(input())).await;

        assert_eq!(kinds(&events), "metadata chunk chunk error");
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let generator = Arc::new(
            ScriptedGenerator::new("ignored")
                .with_fragments(["{", "}"])
                .with_failure(Failure::StallAfter(1)),
        );
        let relay = relay_for(&generator, Duration::from_millis(100));
        let events = collect(relay.start(input())).await;

        assert_eq!(kinds(&events), "metadata chunk error");
        let Some(StreamEvent::Error { error, .. }) = events.last() else {
            panic!("missing error event");
        };
        assert!(error.ends_with("maximum duration of 100ms"), "got {error}");
        assert!(generator.was_cancelled());
    }

    #[tokio::test]
    async fn test_unparsable_output_ends_with_error() {
        let generator = Arc::new(ScriptedGenerator::new("Nothing structured here, sorry."));
        let events = collect(relay_for(&generator, Duration::from_secs(5)).start(input())).await;

        let order = Regex::new(r"^metadata( chunk)* error$").unwrap();
        assert!(order.is_match(&kinds(&events)), "got {}", kinds(&events));
    }

    #[tokio::test]
    async fn test_blank_input_errors_without_backend_call() {
        let generator = Arc::new(ScriptedGenerator::new(MODEL_OUTPUT));
        let relay = relay_for(&generator, Duration::from_secs(5));
        let events = collect(relay.start(ConversationInput::new("   "))).await;

        assert_eq!(kinds(&events), "metadata error");
        assert_eq!(generator.calls(), 0);
    }
}
