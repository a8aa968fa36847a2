//! Summarizer: prompt, generate, parse.
//!
//! One instance is shared by every request. Per-request state (the fragment
//! accumulator, timings) lives in [`SummaryStream`], which is owned by the
//! request that created it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::parser::OutputParser;
use super::prompt::build_prompt;
use super::types::{ConversationInput, ProcessingMetadata, SummaryReport};
use crate::error::{SummarizeError, SummarizeResult};
use crate::ids::RequestId;
use crate::llm::{FragmentStream, TextGenerator};

/// Turns transcripts into structured summaries through a [`TextGenerator`].
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    parser: OutputParser,
    include_raw_response: bool,
}

impl Summarizer {
    /// Create a summarizer over a backend.
    ///
    /// # Errors
    /// Returns an error if the parser patterns fail to compile.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Result<Self, regex::Error> {
        Ok(Self {
            generator,
            parser: OutputParser::new()?,
            include_raw_response: true,
        })
    }

    /// Whether results carry the unmodified backend output.
    #[must_use]
    pub const fn with_raw_response(mut self, include: bool) -> Self {
        self.include_raw_response = include;
        self
    }

    /// Model used for generation.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// The backend this summarizer talks to.
    #[must_use]
    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Summarize a transcript in one blocking backend call.
    ///
    /// # Errors
    /// `InvalidInput` for a blank transcript (no backend call is made),
    /// `BackendUnavailable` if generation fails, `MalformedModelOutput` if the
    /// response cannot be parsed.
    pub async fn summarize(&self, input: &ConversationInput) -> SummarizeResult<SummaryReport> {
        input.validate()?;
        let request_id = RequestId::new();
        let started = Instant::now();
        let conversation_length = input.char_len();

        info!(
            %request_id,
            conversation_length,
            model = self.model_name(),
            "Summarizing conversation"
        );

        let raw = self
            .generator
            .generate(&build_prompt(&input.conversation))
            .await
            .map_err(|e| {
                warn!(%request_id, "Backend generation failed: {e}");
                SummarizeError::from(e)
            })?;

        let report = self.finish(&raw, conversation_length, started)?;
        debug!(%request_id, "Conversation summarized");
        Ok(report)
    }

    /// Start a streaming summarization.
    ///
    /// The returned stream yields fragments as the backend produces them and
    /// is parsed with [`SummaryStream::finish`] once exhausted.
    ///
    /// # Errors
    /// `InvalidInput` for a blank transcript (no backend call is made),
    /// `BackendUnavailable` if the backend refuses the request.
    pub async fn stream(self: &Arc<Self>, input: &ConversationInput) -> SummarizeResult<SummaryStream> {
        input.validate()?;
        let started = Instant::now();
        let conversation_length = input.char_len();

        info!(
            conversation_length,
            model = self.model_name(),
            "Streaming conversation summary"
        );

        let fragments = self
            .generator
            .generate_stream(&build_prompt(&input.conversation))
            .await
            .map_err(|e| {
                warn!("Backend stream failed to start: {e}");
                SummarizeError::from(e)
            })?;

        Ok(SummaryStream {
            summarizer: Arc::clone(self),
            fragments,
            accumulated: String::new(),
            accumulated_chars: 0,
            conversation_length,
            started,
        })
    }

    /// Parse a complete backend response and attach processing metadata.
    fn finish(
        &self,
        raw: &str,
        conversation_length: usize,
        started: Instant,
    ) -> SummarizeResult<SummaryReport> {
        let parsed = self.parser.parse(raw).inspect_err(|e| {
            warn!(response_length = raw.len(), "Unusable model output: {e}");
        })?;

        debug!(strategy = ?parsed.strategy, "Model output parsed");

        Ok(SummaryReport {
            summary: parsed.summary,
            metadata: ProcessingMetadata {
                processed_at: Utc::now(),
                model_used: self.model_name().to_string(),
                conversation_length,
                thinking_process: parsed.thinking_process,
                parse_strategy: parsed.strategy,
                processing_time_seconds: started.elapsed().as_secs_f64(),
                raw_response: self.include_raw_response.then(|| raw.to_string()),
            },
        })
    }
}

/// An in-flight streaming summarization.
///
/// Dropping it before [`SummaryStream::finish`] cancels the backend call.
pub struct SummaryStream {
    summarizer: Arc<Summarizer>,
    fragments: FragmentStream,
    accumulated: String,
    accumulated_chars: usize,
    conversation_length: usize,
    started: Instant,
}

impl SummaryStream {
    /// Next fragment, appended to the accumulator before it is returned.
    ///
    /// `None` once the backend has signalled completion.
    pub async fn next_fragment(&mut self) -> Option<SummarizeResult<String>> {
        match self.fragments.next().await? {
            Ok(fragment) => {
                self.accumulated.push_str(&fragment);
                self.accumulated_chars += fragment.chars().count();
                Some(Ok(fragment))
            }
            Err(e) => {
                warn!("Backend stream broke: {e}");
                Some(Err(SummarizeError::from(e)))
            }
        }
    }

    /// Characters received so far.
    #[must_use]
    pub const fn accumulated_len(&self) -> usize {
        self.accumulated_chars
    }

    /// Parse everything received.
    ///
    /// # Errors
    /// Returns `MalformedModelOutput` if the accumulated text cannot be parsed.
    pub fn finish(self) -> SummarizeResult<SummaryReport> {
        let Self {
            summarizer,
            fragments,
            accumulated,
            conversation_length,
            started,
            ..
        } = self;
        drop(fragments);
        summarizer.finish(&accumulated, conversation_length, started)
    }
}
