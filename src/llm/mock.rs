//! Scripted in-process generator for development and testing.
//!
//! Replays a fixed response, either whole or as a fragment script, and records
//! how it was used: how many generation calls were made and whether a
//! fragment stream was dropped before it finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{BackendStatus, FragmentStream, LlmError, TextGenerator};

/// Default fragment size used when splitting a response into a script.
const DEFAULT_FRAGMENT_CHARS: usize = 16;

/// How the scripted backend misbehaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Every call fails as if the backend were down.
    Unreachable,
    /// The stream breaks after this many fragments.
    DisconnectAfter(usize),
    /// The stream stops producing after this many fragments, without ending.
    StallAfter(usize),
}

/// Sets the shared flag when a fragment stream is dropped unfinished.
struct CancelGuard {
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl CancelGuard {
    /// The stream ran to its end; dropping it is no longer a cancellation.
    const fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

/// A deterministic [`TextGenerator`].
pub struct ScriptedGenerator {
    model: String,
    response: String,
    fragments: Vec<String>,
    fragment_delay: Option<Duration>,
    failure: Option<Failure>,
    calls: AtomicUsize,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedGenerator {
    /// Create a generator that always answers with `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        let response = response.into();
        let fragments = split_fragments(&response, DEFAULT_FRAGMENT_CHARS);
        Self {
            model: "scripted".to_string(),
            response,
            fragments,
            fragment_delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the fragment script. The full response becomes their concatenation.
    #[must_use]
    pub fn with_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = fragments.into_iter().map(Into::into).collect();
        self.response = self.fragments.concat();
        self
    }

    /// Set the reported model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sleep before each streamed fragment.
    #[must_use]
    pub const fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    /// Make the backend misbehave.
    #[must_use]
    pub const fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Number of generation calls (single-shot and streaming) received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether a fragment stream was dropped before it finished.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record_call(&self) -> Result<(), LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failure == Some(Failure::Unreachable) {
            return Err(LlmError::HttpClient("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.record_call()?;
        Ok(self.response.clone())
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<FragmentStream, LlmError> {
        self.record_call()?;

        let fragments = self.fragments.clone();
        let delay = self.fragment_delay;
        let failure = self.failure;
        let guard = CancelGuard {
            cancelled: Arc::clone(&self.cancelled),
            finished: false,
        };

        let stream: FragmentStream = Box::pin(async_stream::try_stream! {
            // The stream owns the whole guard.
            let mut guard = guard;
            for (index, fragment) in fragments.into_iter().enumerate() {
                match failure {
                    Some(Failure::DisconnectAfter(n)) if index == n => {
                        guard.finish();
                        Err::<(), _>(LlmError::StreamInterrupted)?;
                    }
                    Some(Failure::StallAfter(n)) if index == n => {
                        futures::future::pending::<()>().await;
                    }
                    _ => {}
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield fragment;
            }
            guard.finish();
        });

        Ok(stream)
    }

    async fn status(&self) -> BackendStatus {
        if self.failure == Some(Failure::Unreachable) {
            return BackendStatus::unreachable("connection refused");
        }
        BackendStatus {
            reachable: true,
            model_available: true,
            available_models: vec![self.model.clone()],
            error: None,
        }
    }
}

/// Split text into fragments of at most `max_chars` characters.
fn split_fragments(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
