//! Ollama client for conversation summarization.
//!
//! Behaviour:
//! - Single-shot generation via `POST /api/generate` with `stream:false`.
//! - Streaming generation via the same endpoint with `stream:true`; the body is
//!   newline-delimited JSON, one object per fragment, the last one carrying
//!   `done:true`.
//! - Health via `GET /api/tags`, which lists installed models.
//!
//! The `reqwest::Client` is shared by every request. Dropping a
//! [`FragmentStream`] drops the response body, which closes the connection
//! and makes Ollama abandon the generation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{BackendStatus, FragmentStream, LlmError, TextGenerator};
use crate::config::{GenerationOptions, ServiceConfig};

/// HTTP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the health probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: &'a GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

/// One NDJSON line of a streaming generation.
#[derive(Debug, Deserialize, PartialEq, Eq)]
struct StreamLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Async Ollama client implementing [`TextGenerator`].
pub struct OllamaClient {
    client: Client,
    base_url: Url,
    model: String,
    keep_alive: String,
    request_timeout: Duration,
    options: GenerationOptions,
}

impl OllamaClient {
    /// Create a client from the service configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> Result<Self, LlmError> {
        // No overall timeout on the client: streams may legitimately run for
        // minutes. Single-shot calls set a per-request timeout instead.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url(&config.ollama_url)?,
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
            request_timeout: config.request_timeout,
            options: config.generation.clone(),
        })
    }

    /// Resolve an API path (no leading slash) under the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, LlmError> {
        Ok(self.base_url.join(path)?)
    }

    fn request_body<'a>(&'a self, prompt: &'a str, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            keep_alive: &self.keep_alive,
            options: &self.options,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = self.endpoint("api/generate")?;
        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&self.request_body(prompt, false))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: GenerateResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(LlmError::Backend(error));
        }
        body.response
            .ok_or_else(|| LlmError::MalformedResponse("missing `response` field".to_string()))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream, LlmError> {
        let url = self.endpoint("api/generate")?;
        let response = self
            .client
            .post(url)
            .json(&self.request_body(prompt, true))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut body = response.bytes_stream();
        let stream: FragmentStream = Box::pin(async_stream::try_stream! {
            let mut lines = LineBuffer::default();
            let mut finished = false;

            'body: while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(LlmError::from)?;
                lines.extend(&chunk);
                while let Some(line) = lines.next_line() {
                    let parsed = parse_stream_line(&line)?;
                    if let Some(fragment) = parsed.response.filter(|f| !f.is_empty()) {
                        yield fragment;
                    }
                    if parsed.done {
                        finished = true;
                        break 'body;
                    }
                }
            }

            if !finished {
                // A final line without a trailing newline is still a line.
                if let Some(line) = lines.take_remainder() {
                    let parsed = parse_stream_line(&line)?;
                    if let Some(fragment) = parsed.response.filter(|f| !f.is_empty()) {
                        yield fragment;
                    }
                    finished = parsed.done;
                }
            }

            if !finished {
                Err::<(), _>(LlmError::StreamInterrupted)?;
            }
        });

        Ok(stream)
    }

    async fn status(&self) -> BackendStatus {
        let url = match self.endpoint("api/tags") {
            Ok(url) => url,
            Err(e) => return BackendStatus::unreachable(e.to_string()),
        };

        let response = match self.client.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Ollama probe failed: {e}");
                return BackendStatus::unreachable(e.to_string());
            }
        };

        if !response.status().is_success() {
            return BackendStatus::unreachable(format!(
                "ollama http status not ok: {}",
                response.status().as_u16()
            ));
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let available_models: Vec<String> =
                    tags.models.into_iter().map(|m| m.name).collect();
                debug!("Ollama models available: {available_models:?}");
                BackendStatus {
                    reachable: true,
                    model_available: model_installed(&available_models, &self.model),
                    available_models,
                    error: None,
                }
            }
            Err(e) => BackendStatus {
                reachable: true,
                model_available: false,
                available_models: Vec::new(),
                error: Some(format!("unreadable model list: {e}")),
            },
        }
    }
}

/// Base URL with a trailing slash, so relative joins keep any path prefix.
fn base_url(raw: &str) -> Result<Url, LlmError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Error for a non-success reply, keeping Ollama's own message when it sent one.
async fn status_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    match response.json::<GenerateResponse>().await {
        Ok(GenerateResponse {
            error: Some(error),
            ..
        }) => LlmError::Backend(error),
        _ => LlmError::HttpStatusNotOk(status),
    }
}

/// Whether any installed model name contains the configured identifier.
fn model_installed(available: &[String], model: &str) -> bool {
    available.iter().any(|name| name.contains(model))
}

fn parse_stream_line(line: &str) -> Result<StreamLine, LlmError> {
    let parsed: StreamLine = serde_json::from_str(line)
        .map_err(|e| LlmError::MalformedResponse(format!("bad stream line: {e}")))?;
    if let Some(error) = parsed.error {
        return Err(LlmError::Backend(error));
    }
    Ok(parsed)
}

/// Reassembles newline-delimited lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete, non-blank line.
    fn next_line(&mut self) -> Option<String> {
        loop {
            let newline = self.buf.iter().position(|b| *b == b'\n')?;
            let line = self.buf.split_to(newline);
            self.buf.advance(1);
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    /// Whatever is left once the body has ended.
    fn take_remainder(&mut self) -> Option<String> {
        let rest = self.buf.split();
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
