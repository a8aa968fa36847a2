//! Text-generation backends.
//!
//! The pipeline only talks to a backend through [`TextGenerator`]. One shared
//! implementation instance serves every request, so implementations must not
//! keep per-request state.

pub mod error;
pub mod mock;
pub mod ollama;

pub use error::LlmError;
pub use mock::ScriptedGenerator;
pub use ollama::OllamaClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Ordered text fragments produced by a streaming generation.
///
/// The stream ends (`None`) once the backend signals completion. Dropping it
/// early cancels the in-flight generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Reachability report for a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    /// The backend answered the probe.
    pub reachable: bool,
    /// The configured model is installed on the backend.
    pub model_available: bool,
    /// Models the backend reported.
    pub available_models: Vec<String>,
    /// Probe failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendStatus {
    /// Backend is reachable and serves the configured model.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.reachable && self.model_available
    }

    /// Build a status for an unreachable backend.
    #[must_use]
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            model_available: false,
            available_models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A text-completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Identifier of the model used for generation.
    fn model_name(&self) -> &str;

    /// Generate the complete response for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Start a streaming generation, yielding fragments until done.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream, LlmError>;

    /// Probe the backend.
    async fn status(&self) -> BackendStatus;
}
