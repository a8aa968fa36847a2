//! HTTP route handlers for the summarization API.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::HeaderName;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::state::AppState;
use crate::error::{SummarizeError, SummarizeResult};
use crate::ids::PatientId;
use crate::relay::StreamEvent;
use crate::store::ConversationRecord;
use crate::summary::{ConversationInput, SAMPLE_CONVERSATION, SummaryReport};

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/summarize-conversation", post(summarize_conversation))
        .route(
            "/summarize-conversation-stream",
            post(summarize_conversation_stream),
        )
        .route("/test-conversation", get(test_conversation))
        .route("/test-conversation-stream", get(test_conversation_stream))
        .route(
            "/patients/{patient_id}/conversations",
            get(patient_conversations),
        )
        .with_state(state)
}

/// Summarization request.
#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    /// Speaker-labelled transcript.
    pub conversation: String,
    /// Patient to file the summary under.
    #[serde(default)]
    pub patient_id: Option<String>,
}

impl SummarizeRequest {
    /// Validate into a pipeline input.
    ///
    /// # Errors
    /// Returns `InvalidInput` for a blank transcript or a malformed patient id.
    pub fn into_input(self) -> SummarizeResult<ConversationInput> {
        let mut input = ConversationInput::new(self.conversation);
        if let Some(raw) = self.patient_id {
            let patient_id = PatientId::new(&raw)
                .map_err(|e| SummarizeError::InvalidInput(e.to_string()))?;
            input = input.with_patient(patient_id);
        }
        input.validate()?;
        Ok(input)
    }
}

/// Single-shot response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// Whether summarization succeeded.
    pub success: bool,
    /// The summary, on success.
    pub data: Option<SummaryReport>,
    /// Human-readable failure, otherwise.
    pub error: Option<String>,
}

/// Response of the sample-conversation endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestConversationResponse {
    /// Whether summarization succeeded.
    pub success: bool,
    /// The built-in transcript.
    pub sample_conversation: String,
    /// The summary, on success.
    pub generated_summary: Option<SummaryReport>,
    /// Human-readable failure, otherwise.
    pub error: Option<String>,
}

/// Health report.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` when the backend is reachable and serves the model.
    pub status: String,
    /// Configured model.
    pub model: String,
    /// Whether the backend answered.
    pub ollama_connected: bool,
    /// Models installed on the backend.
    pub available_models: Vec<String>,
    /// Probe failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
}

/// Stored conversations for one patient.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatientConversationsResponse {
    /// Patient identifier.
    pub patient_id: PatientId,
    /// Records, newest first.
    pub conversations: Vec<ConversationRecord>,
    /// Number of records.
    pub count: usize,
}

/// Backend health check.
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let backend = state.summarizer.generator().status().await;
    let healthy = backend.is_healthy();

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        model: state.summarizer.model_name().to_string(),
        ollama_connected: backend.reachable,
        available_models: backend.available_models,
        error: backend.error,
        timestamp: Utc::now(),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// Summarize a transcript in one call.
async fn summarize_conversation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Response {
    let input = match read_request(payload) {
        Ok(input) => input,
        Err(e) => return failure(&e),
    };

    match state.summarizer.summarize(&input).await {
        Ok(report) => {
            state.persist(&input, &report).await;
            Json(SummaryResponse {
                success: true,
                data: Some(report),
                error: None,
            })
            .into_response()
        }
        Err(e) => failure(&e),
    }
}

/// Summarize a transcript as a server-sent event stream.
async fn summarize_conversation_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Response {
    let input = match read_request(payload) {
        Ok(input) => input,
        Err(e) => return failure(&e),
    };

    let rx = state.relay.start(input.clone());
    sse_response(event_stream(state, input, None, rx))
}

/// Summarize the built-in sample transcript.
async fn test_conversation(State(state): State<Arc<AppState>>) -> Response {
    let input = ConversationInput::new(SAMPLE_CONVERSATION);

    match state.summarizer.summarize(&input).await {
        Ok(report) => Json(TestConversationResponse {
            success: true,
            sample_conversation: SAMPLE_CONVERSATION.to_string(),
            generated_summary: Some(report),
            error: None,
        })
        .into_response(),
        Err(e) => (
            e.status_code(),
            Json(TestConversationResponse {
                success: false,
                sample_conversation: SAMPLE_CONVERSATION.to_string(),
                generated_summary: None,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

/// Stream the built-in sample transcript, announced by a `sample` event.
async fn test_conversation_stream(State(state): State<Arc<AppState>>) -> Response {
    let input = ConversationInput::new(SAMPLE_CONVERSATION);
    let rx = state.relay.start(input.clone());
    let prelude = StreamEvent::sample(SAMPLE_CONVERSATION);
    sse_response(event_stream(state, input, Some(prelude), rx))
}

/// List stored conversations for a patient.
async fn patient_conversations(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<String>,
) -> Response {
    let patient_id = match PatientId::new(&patient_id) {
        Ok(id) => id,
        Err(e) => return failure(&SummarizeError::InvalidInput(e.to_string())),
    };

    match state.store.list_for_patient(&patient_id).await {
        Ok(conversations) => Json(PatientConversationsResponse {
            count: conversations.len(),
            patient_id,
            conversations,
        })
        .into_response(),
        Err(e) => {
            warn!(%patient_id, "Failed to list conversations: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn read_request(
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> SummarizeResult<ConversationInput> {
    let Json(request) = payload.map_err(|e| SummarizeError::InvalidInput(e.body_text()))?;
    let input = request.into_input()?;
    info!(
        conversation_length = input.char_len(),
        has_patient = input.patient_id.is_some(),
        "Conversation received"
    );
    Ok(input)
}

/// Failure envelope with the status mapped from the error.
fn failure(error: &SummarizeError) -> Response {
    (
        error.status_code(),
        Json(SummaryResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }),
    )
        .into_response()
}

/// Translate relay events into SSE frames, persisting the final result.
fn event_stream(
    state: Arc<AppState>,
    input: ConversationInput,
    prelude: Option<StreamEvent>,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        if let Some(event) = prelude {
            yield Ok(to_sse(&event));
        }

        while let Some(event) = rx.recv().await {
            if let StreamEvent::Final(report) = &event {
                state.persist(&input, report).await;
            }
            let terminal = event.is_terminal();
            yield Ok(to_sse(&event));
            if terminal {
                break;
            }
        }
    }
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!(kind = event.kind(), "Failed to serialize stream event: {e}");
        let fallback = serde_json::json!({
            "type": "error",
            "data": {
                "error": format!("serialization error: {e}"),
                "timestamp": Utc::now(),
            }
        });
        Event::default().data(fallback.to_string())
    })
}

fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );
    // Keeps reverse proxies from buffering the stream.
    (
        [(HeaderName::from_static("x-accel-buffering"), "no")],
        sse,
    )
        .into_response()
}
