//! Configuration for the summarization service.
//!
//! Values come from environment variables with local-development defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable for the backend base URL.
pub const OLLAMA_URL_ENV: &str = "SUMMARIZER_OLLAMA_URL";
/// Environment variable for the model identifier.
pub const MODEL_ENV: &str = "SUMMARIZER_MODEL";
/// Environment variable for the HTTP listen port.
pub const PORT_ENV: &str = "SUMMARIZER_PORT";
/// Environment variable for the maximum stream duration (seconds).
pub const MAX_STREAM_SECS_ENV: &str = "SUMMARIZER_MAX_STREAM_SECS";
/// Environment variable for the single-shot request timeout (seconds).
pub const REQUEST_TIMEOUT_SECS_ENV: &str = "SUMMARIZER_REQUEST_TIMEOUT_SECS";
/// Environment variable for the backend keep-alive hint.
pub const KEEP_ALIVE_ENV: &str = "SUMMARIZER_KEEP_ALIVE";

/// Default backend URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
/// Default model.
pub const DEFAULT_MODEL: &str = "qwen3:8b";
/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Sampling options forwarded to the backend on every generation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Low temperature keeps extraction factual.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Token budget for one response.
    pub num_predict: u32,
    /// Repetition penalty.
    pub repeat_penalty: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            num_predict: 1500,
            repeat_penalty: 1.1,
        }
    }
}

/// Top-level service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Backend base URL.
    pub ollama_url: String,
    /// Model identifier used for every request.
    pub model: String,
    /// HTTP listen port.
    pub port: u16,
    /// Upper bound on a single stream.
    #[serde(with = "duration_serde")]
    pub max_stream_duration: Duration,
    /// HTTP timeout for single-shot generation.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// How long the backend keeps the model loaded after a call.
    pub keep_alive: String,
    /// Sampling options.
    pub generation: GenerationOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            port: DEFAULT_PORT,
            max_stream_duration: Duration::from_secs(300),
            request_timeout: Duration::from_secs(120),
            keep_alive: "5m".to_string(),
            generation: GenerationOptions::default(),
        }
    }
}

impl ServiceConfig {
    /// Build a config from the process environment, falling back to defaults.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or validation fails.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            ollama_url: lookup(OLLAMA_URL_ENV).unwrap_or(defaults.ollama_url),
            model: lookup(MODEL_ENV).unwrap_or(defaults.model),
            port: parse_var(&lookup, PORT_ENV)?.unwrap_or(defaults.port),
            max_stream_duration: parse_var(&lookup, MAX_STREAM_SECS_ENV)?
                .map_or(defaults.max_stream_duration, Duration::from_secs),
            request_timeout: parse_var(&lookup, REQUEST_TIMEOUT_SECS_ENV)?
                .map_or(defaults.request_timeout, Duration::from_secs),
            keep_alive: lookup(KEEP_ALIVE_ENV).unwrap_or(defaults.keep_alive),
            generation: defaults.generation,
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the backend URL.
    #[must_use]
    pub fn with_ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = url.into();
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the maximum stream duration.
    #[must_use]
    pub const fn with_max_stream_duration(mut self, duration: Duration) -> Self {
        self.max_stream_duration = duration;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.ollama_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be > 0".to_string()));
        }

        if self.max_stream_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "max_stream_duration must be > 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value: {raw}"))),
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.model, "qwen3:8b");
        assert_eq!(config.port, 8000);
        assert_eq!(config.generation.num_predict, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (OLLAMA_URL_ENV, "http://gpu-box:11434"),
            (MODEL_ENV, "llama3.2"),
            (PORT_ENV, "9100"),
            (MAX_STREAM_SECS_ENV, "30"),
        ]))
        .unwrap();

        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_stream_duration, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let result = ServiceConfig::from_lookup(lookup_from(&[(PORT_ENV, "eighty")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_invalid_values() {
        let bad_url = ServiceConfig::default().with_ollama_url("not a url");
        assert!(matches!(bad_url.validate(), Err(ConfigError::Url(_))));

        let zero_stream = ServiceConfig::default().with_max_stream_duration(Duration::ZERO);
        assert!(matches!(zero_stream.validate(), Err(ConfigError::Invalid(_))));

        let blank_model = ServiceConfig::default().with_model("  ");
        assert!(blank_model.validate().is_err());
    }
}
