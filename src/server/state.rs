//! Application state shared across all request handlers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::llm::{OllamaClient, TextGenerator};
use crate::relay::StreamRelay;
use crate::store::{ConversationRecord, ConversationStore, InMemoryConversationStore};
use crate::summary::{ConversationInput, Summarizer, SummaryReport};

/// Shared application state.
pub struct AppState {
    /// Summarizer used by every request.
    pub summarizer: Arc<Summarizer>,
    /// Relay for streaming requests.
    pub relay: StreamRelay,
    /// Where summaries for identified patients are kept.
    pub store: Arc<dyn ConversationStore>,
    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create state backed by Ollama and an in-memory store.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be created.
    pub fn new(config: ServiceConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let client = OllamaClient::new(&config)
            .map_err(|e| format!("Failed to create Ollama client: {e}"))?;

        Self::with_generator(
            config,
            Arc::new(client),
            Arc::new(InMemoryConversationStore::new()),
        )
    }

    /// Create state over an arbitrary backend and store.
    ///
    /// # Errors
    /// Returns an error if the summarizer cannot be built.
    pub fn with_generator(
        config: ServiceConfig,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let summarizer = Arc::new(Summarizer::new(generator)?);
        let relay = StreamRelay::new(Arc::clone(&summarizer), config.max_stream_duration);

        Ok(Arc::new(Self {
            summarizer,
            relay,
            store,
            config,
        }))
    }

    /// Save a successful summary when the request named a patient.
    ///
    /// Failures are logged; the summary itself is unaffected.
    pub async fn persist(&self, input: &ConversationInput, report: &SummaryReport) {
        let Some(patient_id) = &input.patient_id else {
            return;
        };

        let record = ConversationRecord::new(
            patient_id.clone(),
            input.conversation.clone(),
            report.clone(),
        );
        match self.store.save(record).await {
            Ok(record_id) => info!(%record_id, %patient_id, "Conversation record saved"),
            Err(e) => warn!(%patient_id, "Failed to save conversation record: {e}"),
        }
    }
}
